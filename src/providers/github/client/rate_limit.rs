use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

use crate::config::FetchConfig;
use crate::error::{FlowLensError, Result};

const REMAINING: &str = "x-ratelimit-remaining";
const RESET: &str = "x-ratelimit-reset";

/// Quota state reported by one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateWindow {
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateWindow {
    /// Reads the rate-limit headers. A `Retry-After` in seconds stands in for
    /// a missing reset time.
    pub fn from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Self {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        let remaining = header(REMAINING).and_then(|v| v.trim().parse().ok());
        let reset_at = header(RESET)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                headers
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<i64>().ok())
                    .map(|secs| now + chrono::Duration::seconds(secs))
            });

        Self {
            remaining,
            reset_at,
        }
    }
}

/// Pacing and backoff knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub safety_margin: Duration,
    pub low_water: u32,
    pub max_pacing: Duration,
    pub max_quota_wait: Duration,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for RatePolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            safety_margin: Duration::from_secs(config.safety_margin_secs),
            low_water: config.low_water,
            max_pacing: Duration::from_millis(config.max_pacing_ms),
            max_quota_wait: Duration::from_secs(config.max_quota_wait_secs),
        }
    }
}

/// Whether a response is the server refusing work until the quota resets.
pub fn is_exhausted(status: StatusCode, window: &RateWindow) -> bool {
    match status {
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::FORBIDDEN => window.remaining == Some(0),
        _ => false,
    }
}

/// GraphQL reports quota exhaustion as an error message on a 200 response.
pub fn is_graphql_quota_error(message: &str) -> bool {
    message.to_lowercase().contains("rate limit")
}

fn until(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (reset_at - now).to_std().unwrap_or(Duration::ZERO)
}

/// Time to wait before retrying an exhausted request.
///
/// # Errors
///
/// `RateLimited` when the server gave no usable reset time.
pub fn quota_wait(
    reset_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &RatePolicy,
) -> Result<Duration> {
    let reset_at = reset_at.ok_or(FlowLensError::RateLimited)?;
    Ok((until(reset_at, now) + policy.safety_margin).min(policy.max_quota_wait))
}

/// Delay to insert after a successful response while quota is running low.
pub fn pacing_delay(window: &RateWindow, now: DateTime<Utc>, policy: &RatePolicy) -> Option<Duration> {
    let remaining = window.remaining?;
    if remaining >= policy.low_water {
        return None;
    }
    let reset_at = window.reset_at?;

    if remaining == 0 {
        return Some((until(reset_at, now) + policy.safety_margin).min(policy.max_quota_wait));
    }

    let delay = until(reset_at, now) / (remaining + 1);
    Some(delay.min(policy.max_pacing))
}
