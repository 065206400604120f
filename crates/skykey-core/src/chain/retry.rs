//! Delay between assume-role attempts.

use std::time::Duration;

use super::config::{RetryBackoff, RoleChainConfig};

/// Longest single sleep between attempts, whatever the backoff shape.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Delay to wait after `failed_attempt` (1-based) before trying again.
pub fn retry_delay(config: &RoleChainConfig, failed_attempt: u32) -> Duration {
    let base = config.retry_delay_ms;
    let attempt = u64::from(failed_attempt.max(1));

    let delay_ms = match config.retry_backoff {
        RetryBackoff::Fixed => base,
        RetryBackoff::Linear => base.saturating_mul(attempt),
        RetryBackoff::Exponential => {
            let factor = 1u64.checked_shl((attempt - 1) as u32).unwrap_or(u64::MAX);
            base.saturating_mul(factor)
        }
    };

    Duration::from_millis(delay_ms).min(MAX_RETRY_DELAY)
}
