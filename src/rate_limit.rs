//! Proactive rate-limit budget tracking.
//!
//! The limiter keeps the most recent budget observation for one client.
//! Reading it with [`RateLimiter::should_wait`] and later updating it with
//! [`RateLimiter::observe`] is not atomic, so dispatch through a single
//! limiter must stay sequential.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;

const REMAINING_HEADERS: [&str; 2] = ["ratelimit-remaining", "x-ratelimit-remaining"];
const RESET_HEADERS: [&str; 2] = ["ratelimit-reset", "x-ratelimit-reset"];
const LIMIT_HEADERS: [&str; 2] = ["ratelimit-limit", "x-ratelimit-limit"];
const RETRY_AFTER_HEADER: &str = "retry-after";

/// Reset values up to one year are read as seconds-until-reset.
const MAX_RELATIVE_RESET_SECS: f64 = 365.0 * 24.0 * 60.0 * 60.0;
/// Absolute reset values beyond this are read as Unix milliseconds.
const MAX_ABSOLUTE_RESET_SECS: f64 = 1e12;

/// Last observed consumption state of the remote budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitState {
    /// Calls left before the service starts rejecting.
    pub remaining: u64,
    /// Point in time when the budget replenishes.
    pub reset_at: SystemTime,
    /// Budget ceiling, when the service reports one.
    pub limit: Option<u64>,
}

/// Shared view of the remaining budget for one client instance.
#[derive(Clone, Debug, Default)]
pub struct RateLimiter {
    state: Option<RateLimitState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last observation, if any response carried budget headers.
    pub fn state(&self) -> Option<&RateLimitState> {
        self.state.as_ref()
    }

    /// Records budget headers from a response, replacing the prior state.
    ///
    /// Responses without a parseable remaining count leave the state as is.
    pub fn observe(&mut self, headers: &HeaderMap) {
        self.observe_at(headers, SystemTime::now());
    }

    /// Same as [`RateLimiter::observe`] with an explicit clock reading.
    pub fn observe_at(&mut self, headers: &HeaderMap, now: SystemTime) {
        let Some(remaining) = header_value(headers, &REMAINING_HEADERS)
            .and_then(|raw| raw.parse::<i64>().ok())
        else {
            return;
        };

        let reset_at = header_value(headers, &RESET_HEADERS)
            .and_then(|raw| parse_reset(raw, now))
            .unwrap_or(now);
        let limit = header_value(headers, &LIMIT_HEADERS).and_then(|raw| raw.parse::<u64>().ok());

        let state = RateLimitState {
            remaining: remaining.max(0) as u64,
            reset_at,
            limit,
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(
            remaining = state.remaining,
            limit = ?state.limit,
            "observed rate limit budget"
        );

        self.state = Some(state);
    }

    /// How long the next send must wait for the budget to replenish.
    pub fn should_wait(&self) -> Duration {
        self.should_wait_at(SystemTime::now())
    }

    /// Same as [`RateLimiter::should_wait`] with an explicit clock reading.
    pub fn should_wait_at(&self, now: SystemTime) -> Duration {
        match &self.state {
            Some(state) if state.remaining == 0 => state
                .reset_at
                .duration_since(now)
                .unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }
}

/// Reads the server-suggested wait from `Retry-After`.
///
/// Accepts delay-seconds (integer or fractional, at most one year) and the
/// HTTP-date form. A date in the past means no wait.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    retry_after_at(headers, SystemTime::now())
}

fn retry_after_at(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let raw = header_value(headers, &[RETRY_AFTER_HEADER])?;

    if let Ok(seconds) = raw.parse::<f64>() {
        if !seconds.is_finite() || !(0.0..=MAX_RELATIVE_RESET_SECS).contains(&seconds) {
            return None;
        }
        return Duration::try_from_secs_f64(seconds).ok();
    }

    let date = chrono::DateTime::parse_from_rfc2822(raw).ok()?;
    Some(
        SystemTime::from(date)
            .duration_since(now)
            .unwrap_or(Duration::ZERO),
    )
}

fn header_value<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| headers.get(*name))
        .find_map(|value| value.to_str().ok())
        .map(str::trim)
}

fn parse_reset(raw: &str, now: SystemTime) -> Option<SystemTime> {
    let value = raw.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    if value <= MAX_RELATIVE_RESET_SECS {
        now.checked_add(Duration::from_secs_f64(value))
    } else if value > MAX_ABSOLUTE_RESET_SECS {
        UNIX_EPOCH.checked_add(Duration::from_millis(value as u64))
    } else {
        UNIX_EPOCH.checked_add(Duration::from_secs_f64(value))
    }
}
