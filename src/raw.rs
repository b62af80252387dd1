//! Whole-body response passthrough.
//!
//! Enabled with the `raw-mode` feature.

/// Entire JSON body of a successful response, `data` envelope included.
#[derive(Clone, Debug, PartialEq)]
pub struct RawResponse(pub serde_json::Value);

impl RawResponse {
    /// The `data` field, if the body carries one.
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.0.get("data")
    }
}
