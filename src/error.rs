use std::time::Duration;

use reqwest::StatusCode;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum OutlineError {
    /// Malformed or empty input, or a 400/422 rejection.
    #[error("validation error: {0}")]
    Validation(String),
    /// The requested resource does not exist (404).
    #[error("not found: {message}")]
    NotFound { message: String },
    /// Missing, invalid or insufficient credentials (401/403).
    #[error("auth error {status}: {message}")]
    Auth { status: u16, message: String },
    /// Rate-limit budget exceeded (429) and retries are exhausted.
    #[error("rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Error message text from upstream API.
        message: String,
        /// Wait suggested by the `Retry-After` header, if any.
        retry_after: Option<Duration>,
    },
    /// Upstream failure (5xx).
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    /// Any other non-success status code.
    #[error("unexpected http status {status}: {message}")]
    Unknown { status: u16, message: String },
    /// A 2xx response whose body reports that the operation did not happen.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Client configuration is missing or invalid.
    #[error("config error: {0}")]
    Config(String),
}

impl OutlineError {
    /// Maps a non-success response onto an error kind.
    ///
    /// Every status code lands in exactly one kind. `body` is the raw
    /// response text; the message is taken from its JSON `message` or
    /// `error` field when present.
    pub fn from_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> Self {
        let message = error_message(status, body);
        let code = status.as_u16();
        match code {
            404 => Self::NotFound { message },
            401 | 403 => Self::Auth {
                status: code,
                message,
            },
            429 => Self::RateLimitExceeded {
                message,
                retry_after,
            },
            400 | 422 => Self::Validation(message),
            500..=599 => Self::Server {
                status: code,
                message,
            },
            _ => Self::Unknown {
                status: code,
                message,
            },
        }
    }

    /// Returns the HTTP status for errors derived from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::RateLimitExceeded { .. } => Some(429),
            Self::Auth { status, .. } | Self::Server { status, .. } | Self::Unknown { status, .. } => {
                Some(*status)
            }
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            Self::Validation(_) | Self::Rejected(_) | Self::Decode(_) | Self::Config(_) => None,
        }
    }

    /// True for budget rejections, the only kind worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(text) = map.get(key).and_then(|value| value.as_str()) {
                if !text.trim().is_empty() {
                    return text.to_owned();
                }
            }
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_owned();
    }

    status
        .canonical_reason()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("status {}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(code: u16) -> OutlineError {
        let status = StatusCode::from_u16(code).expect("valid status code");
        OutlineError::from_status(status, "", None)
    }

    #[test]
    fn maps_every_documented_status() {
        assert!(matches!(kind_of(404), OutlineError::NotFound { .. }));
        assert!(matches!(kind_of(401), OutlineError::Auth { status: 401, .. }));
        assert!(matches!(kind_of(403), OutlineError::Auth { status: 403, .. }));
        assert!(matches!(kind_of(429), OutlineError::RateLimitExceeded { .. }));
        assert!(matches!(kind_of(400), OutlineError::Validation(_)));
        assert!(matches!(kind_of(422), OutlineError::Validation(_)));
        assert!(matches!(kind_of(500), OutlineError::Server { status: 500, .. }));
        assert!(matches!(kind_of(503), OutlineError::Server { status: 503, .. }));
        assert!(matches!(kind_of(409), OutlineError::Unknown { status: 409, .. }));
        assert!(matches!(kind_of(302), OutlineError::Unknown { status: 302, .. }));
    }

    #[test]
    fn prefers_json_message_then_error_field() {
        let err = OutlineError::from_status(
            StatusCode::NOT_FOUND,
            r#"{"ok":false,"error":"not_found","message":"Document not found"}"#,
            None,
        );
        assert_eq!(err.to_string(), "not found: Document not found");

        let err = OutlineError::from_status(StatusCode::BAD_REQUEST, r#"{"error":"id is required"}"#, None);
        assert_eq!(err.to_string(), "validation error: id is required");
    }

    #[test]
    fn falls_back_to_raw_body_and_reason() {
        let err = OutlineError::from_status(StatusCode::BAD_GATEWAY, "upstream down", None);
        assert_eq!(err.to_string(), "server error 502: upstream down");

        let err = OutlineError::from_status(StatusCode::SERVICE_UNAVAILABLE, "  ", None);
        assert_eq!(err.to_string(), "server error 503: Service Unavailable");
    }

    #[test]
    fn keeps_suggested_wait_on_rate_limit() {
        let err = OutlineError::from_status(
            StatusCode::TOO_MANY_REQUESTS,
            "{}",
            Some(Duration::from_secs(5)),
        );
        assert!(err.is_rate_limited());
        assert_eq!(err.status(), Some(429));
        match err {
            OutlineError::RateLimitExceeded { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(5)))
            }
            other => panic!("expected rate limit error, got {other:?}"),
        }
    }
}
