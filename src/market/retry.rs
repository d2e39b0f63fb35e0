// =============================================================================
// Retry Policy — back-off for HTTP 429 responses
// =============================================================================
//
// A `Retry-After` header (whole seconds) wins; otherwise the delay doubles
// from `initial_delay` on every attempt. Both are capped at `max_delay`.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::runtime_config::CoinGeckoConfig;

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(120);
const BACKOFF_FACTOR: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CoinGeckoConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.retry_delay_ms),
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn retry_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = retry_after.unwrap_or_else(|| {
            let factor = BACKOFF_FACTOR.saturating_pow(attempt);
            self.initial_delay.saturating_mul(factor)
        });
        delay.min(self.max_delay)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Parse a `Retry-After` header given in seconds. HTTP-date values are not
/// honoured and fall back to exponential back-off.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs: u64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
        }
    }

    #[test]
    fn exponential_backoff_doubles() {
        let p = policy();
        assert_eq!(p.retry_delay(0, None), Duration::from_secs(10));
        assert_eq!(p.retry_delay(1, None), Duration::from_secs(20));
        assert_eq!(p.retry_delay(2, None), Duration::from_secs(40));
    }

    #[test]
    fn backoff_is_capped() {
        let p = policy();
        assert_eq!(p.retry_delay(3, None), Duration::from_secs(60));
        assert_eq!(p.retry_delay(40, None), Duration::from_secs(60));
    }

    #[test]
    fn retry_after_wins_but_is_capped() {
        let p = policy();
        assert_eq!(p.retry_delay(1, Some(Duration::from_secs(3))), Duration::from_secs(3));
        assert_eq!(p.retry_delay(0, Some(Duration::from_secs(600))), Duration::from_secs(60));
    }

    #[test]
    fn retries_bounded() {
        let p = policy();
        assert!(p.should_retry(0));
        assert!(p.should_retry(1));
        assert!(!p.should_retry(2));
    }

    #[test]
    fn parses_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn from_config_uses_retry_settings() {
        let p = RetryPolicy::from_config(&CoinGeckoConfig::default());
        assert_eq!(p.max_retries, 2);
        assert_eq!(p.initial_delay, Duration::from_millis(10_000));
    }
}
