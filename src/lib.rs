//! `outline-http` is an async HTTP client for the Outline document API.
//!
//! Every call goes through one [`RequestExecutor`] per client, which
//! waits out an exhausted rate-limit budget before sending, retries
//! budget rejections with exponential backoff, and records the budget
//! headers of every response. On top of it:
//! - [`OutlineClient`] exposes the document and collection endpoints
//! - [`BatchProcessor`] applies one operation to many items, recording
//!   per-item failures instead of aborting

mod batch;
mod client;
mod error;
mod executor;
mod options;
mod rate_limit;
mod retry;

#[cfg(feature = "raw-mode")]
pub mod raw;

pub use batch::{BatchItem, BatchItemResult, BatchProcessor, BatchResult, BatchStatus, ItemOutcome};
pub use client::{OutlineClient, DEFAULT_API_URL};
pub use error::OutlineError;
pub use executor::RequestExecutor;
pub use options::ClientOptions;
pub use rate_limit::{RateLimitState, RateLimiter};
pub use retry::RetryPolicy;

pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, OutlineError>;
