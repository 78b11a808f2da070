//! Retry policy shared by the upstream HTTP adapters.

use reqwest::StatusCode;
use std::time::Duration;

/// Statuses signalling a transient upstream condition: rate limiting and
/// gateway-level failures.
pub(crate) fn retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE
    )
}

/// Delay before the given retry attempt, doubling per attempt.
pub(crate) fn backoff_delay(attempt: usize) -> Duration {
    Duration::from_millis(250 * (1u64 << attempt))
}
