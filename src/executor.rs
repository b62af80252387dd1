use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::{
    header::{self, HeaderMap},
    Method,
};
use serde_json::{Map, Value};
use tokio::time::sleep;

use crate::{
    rate_limit::{self, RateLimitState, RateLimiter},
    ClientOptions, OutlineError, Result, RetryPolicy,
};

/// Single choke point for authenticated calls to the API.
///
/// Every call waits out an exhausted budget first, is retried on budget
/// rejections, and feeds the response headers back into the shared
/// [`RateLimiter`] whether it succeeded or not.
#[derive(Clone)]
pub struct RequestExecutor {
    http: reqwest::Client,
    base_url: String,
    authorization: String,
    timeout: Duration,
    retry: RetryPolicy,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url)
            .field("authorization", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl RequestExecutor {
    /// Creates an executor that records budget observations into `limiter`.
    pub fn new(
        base_url: impl Into<String>,
        authorization: impl Into<String>,
        options: &ClientOptions,
        limiter: Arc<Mutex<RateLimiter>>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            authorization: authorization.into(),
            timeout: Duration::from_millis(options.timeout_ms),
            retry: options.retry_policy(),
            limiter,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn authorization(&self) -> &str {
        &self.authorization
    }

    /// Shared limiter this executor writes to.
    pub fn rate_limiter(&self) -> Arc<Mutex<RateLimiter>> {
        Arc::clone(&self.limiter)
    }

    /// Snapshot of the last observed budget.
    pub fn rate_limit_state(&self) -> Option<RateLimitState> {
        self.lock_limiter().state().cloned()
    }

    /// Issues one call and returns the `data` field of the response body.
    ///
    /// `payload` is sent as a JSON body for methods that carry one and as
    /// query parameters otherwise. A success body without `data` yields
    /// [`Value::Null`].
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
    ) -> Result<Value> {
        let body = self.execute_body(method, path, payload).await?;
        Ok(match body {
            Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        })
    }

    /// Like [`RequestExecutor::execute`] but returns the whole body.
    pub(crate) async fn execute_body(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
    ) -> Result<Value> {
        self.wait_for_budget().await;
        self.retry
            .attempt(move || self.send_once(method.clone(), path, payload))
            .await
    }

    async fn wait_for_budget(&self) {
        let wait = self.lock_limiter().should_wait();
        if wait.is_zero() {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            wait_ms = wait.as_millis() as u64,
            "rate limit budget exhausted, waiting for reset"
        );

        sleep(wait).await;
    }

    async fn send_once(&self, method: Method, path: &str, payload: Option<&Value>) -> Result<Value> {
        let url = join_url(&self.base_url, path);
        let carries_body = matches!(method, Method::POST | Method::PUT | Method::PATCH);

        let mut request = self
            .http
            .request(method, &url)
            .header(header::AUTHORIZATION, &self.authorization)
            .header(header::ACCEPT, "application/json")
            .timeout(self.timeout);

        if carries_body {
            let empty = Value::Object(Map::new());
            request = request.json(payload.unwrap_or(&empty));
        } else if let Some(payload) = payload {
            request = request.query(payload);
        }

        let response = request.send().await.map_err(OutlineError::Transport)?;
        let status = response.status();
        self.observe(response.headers());
        let retry_after = self.suggested_wait(response.headers());
        let body = response.text().await.map_err(OutlineError::Transport)?;

        if !status.is_success() {
            return Err(OutlineError::from_status(status, &body, retry_after));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|err| {
            OutlineError::Decode(format!(
                "invalid response JSON from {path}: {err}; body: {}",
                body_excerpt(&body)
            ))
        })
    }

    /// Wait to suggest to the retry policy: the larger of `Retry-After`
    /// and the time left until an exhausted budget resets.
    fn suggested_wait(&self, headers: &HeaderMap) -> Option<Duration> {
        let retry_after = rate_limit::retry_after(headers);
        let budget_wait = self.lock_limiter().should_wait();
        if budget_wait.is_zero() {
            return retry_after;
        }
        Some(retry_after.map_or(budget_wait, |wait| wait.max(budget_wait)))
    }

    fn observe(&self, headers: &HeaderMap) {
        self.lock_limiter().observe(headers);
    }

    fn lock_limiter(&self) -> MutexGuard<'_, RateLimiter> {
        self.limiter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

const MAX_BODY_EXCERPT: usize = 512;

fn body_excerpt(body: &str) -> String {
    if body.len() <= MAX_BODY_EXCERPT {
        return body.to_owned();
    }

    let mut end = MAX_BODY_EXCERPT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &body[..end], body.len())
}

fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
