// =============================================================================
// Rate-Limit Tracker — monitors CoinGecko API usage to avoid 429s
// =============================================================================
//
// CoinGecko reports its budget in three response headers:
//   - x-ratelimit-remaining  calls left in the current window
//   - x-ratelimit            calls allowed per window
//   - x-ratelimit-reset      unix time (seconds) the window resets
//
// The tracker only accepts a complete, numeric header set and keeps atomic
// counters that any task may query lock-free.
// =============================================================================

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use reqwest::header::HeaderMap;
use serde::Serialize;
use tracing::{debug, warn};

/// Below this many remaining calls every update logs a warning.
const REMAINING_WARN_THRESHOLD: u32 = 10;

/// Thread-safe rate-limit tracker backed by atomic counters.
pub struct RateLimitTracker {
    remaining: AtomicU32,
    limit: AtomicU32,
    reset_time: AtomicI64,
    /// Unix ms of the last accepted header set, 0 when none yet.
    last_updated_ms: AtomicI64,
}

/// Immutable snapshot of the current rate-limit state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    pub remaining: u32,
    pub limit: u32,
    pub reset_time: i64,
    /// Seconds until the window resets, as of this snapshot.
    pub remaining_time: i64,
    pub last_updated: Option<String>,
}

impl RateLimitTracker {
    /// Start with the configured budget fully available.
    pub fn new(limit: u32) -> Self {
        Self {
            remaining: AtomicU32::new(limit),
            limit: AtomicU32::new(limit),
            reset_time: AtomicI64::new(0),
            last_updated_ms: AtomicI64::new(0),
        }
    }

    // -------------------------------------------------------------------------
    // Header-based updates
    // -------------------------------------------------------------------------

    /// Update counters from a CoinGecko response. Returns `false` when the
    /// header set was missing or malformed and nothing changed.
    pub fn update_from_headers(&self, headers: &HeaderMap) -> bool {
        let remaining = header_num::<u32>(headers, "x-ratelimit-remaining");
        let limit = header_num::<u32>(headers, "x-ratelimit");
        let reset = header_num::<i64>(headers, "x-ratelimit-reset");

        match (remaining, limit, reset) {
            (Some(remaining), Some(limit), Some(reset)) => {
                self.record(remaining, limit, reset, Utc::now().timestamp_millis());
                true
            }
            _ => false,
        }
    }

    /// Store a complete reading taken at `now_ms`.
    pub fn record(&self, remaining: u32, limit: u32, reset_time: i64, now_ms: i64) {
        let remaining_time = (reset_time - now_ms / 1000).max(0);

        self.remaining.store(remaining, Ordering::Relaxed);
        self.limit.store(limit, Ordering::Relaxed);
        self.reset_time.store(reset_time, Ordering::Relaxed);
        self.last_updated_ms.store(now_ms, Ordering::Relaxed);

        if remaining < REMAINING_WARN_THRESHOLD {
            warn!(
                remaining,
                limit,
                resets_in_secs = remaining_time,
                "rate-limit budget running low"
            );
        }
        debug!(remaining, limit, reset_time, "rate-limit updated from headers");
    }

    // -------------------------------------------------------------------------
    // Pre-flight checks
    // -------------------------------------------------------------------------

    /// Pause owed before the next request when `threshold` or fewer calls
    /// remain: the time left in the window plus one second. Nothing is owed
    /// once the window has reset.
    pub fn wait_before_request(&self, threshold: u32) -> Option<Duration> {
        self.wait_before_request_at(threshold, Utc::now().timestamp())
    }

    fn wait_before_request_at(&self, threshold: u32, now_secs: i64) -> Option<Duration> {
        if self.last_updated_ms.load(Ordering::Relaxed) == 0 {
            return None;
        }
        if self.remaining.load(Ordering::Relaxed) > threshold {
            return None;
        }
        let secs_left = self.reset_time.load(Ordering::Relaxed) - now_secs;
        if secs_left < 0 {
            return None;
        }
        Some(Duration::from_secs(secs_left as u64 + 1))
    }

    /// Seconds until the window resets, 0 once it has.
    fn seconds_until_reset(&self, now_secs: i64) -> i64 {
        (self.reset_time.load(Ordering::Relaxed) - now_secs).max(0)
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Relaxed)
    }

    // -------------------------------------------------------------------------
    // Snapshot
    // -------------------------------------------------------------------------

    pub fn snapshot(&self) -> RateLimitSnapshot {
        let last_updated_ms = self.last_updated_ms.load(Ordering::Relaxed);
        let last_updated = if last_updated_ms == 0 {
            None
        } else {
            Utc.timestamp_millis_opt(last_updated_ms)
                .single()
                .map(|t| t.to_rfc3339())
        };

        RateLimitSnapshot {
            remaining: self.remaining.load(Ordering::Relaxed),
            limit: self.limit.load(Ordering::Relaxed),
            reset_time: self.reset_time.load(Ordering::Relaxed),
            remaining_time: self.seconds_until_reset(Utc::now().timestamp()),
            last_updated,
        }
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTracker")
            .field("remaining", &self.remaining.load(Ordering::Relaxed))
            .field("limit", &self.limit.load(Ordering::Relaxed))
            .field("reset_time", &self.reset_time.load(Ordering::Relaxed))
            .finish()
    }
}

fn header_num<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn starts_with_full_budget() {
        let tracker = RateLimitTracker::new(8);
        let snap = tracker.snapshot();
        assert_eq!(snap.remaining, 8);
        assert_eq!(snap.limit, 8);
        assert!(snap.last_updated.is_none());
        assert!(tracker.wait_before_request(2).is_none());
    }

    #[test]
    fn complete_header_set_is_recorded() {
        let tracker = RateLimitTracker::new(8);
        let reset = Utc::now().timestamp() + 120;
        let accepted = tracker.update_from_headers(&headers(&[
            ("x-ratelimit-remaining", "25"),
            ("x-ratelimit", "30"),
            ("x-ratelimit-reset", &reset.to_string()),
        ]));
        assert!(accepted);
        let snap = tracker.snapshot();
        assert_eq!(snap.remaining, 25);
        assert_eq!(snap.limit, 30);
        assert_eq!(snap.reset_time, reset);
        assert!(snap.remaining_time > 100 && snap.remaining_time <= 120);
        assert!(snap.last_updated.is_some());
    }

    #[test]
    fn incomplete_header_set_is_ignored() {
        let tracker = RateLimitTracker::new(8);
        assert!(!tracker.update_from_headers(&headers(&[("x-ratelimit-remaining", "1")])));
        assert!(!tracker.update_from_headers(&headers(&[
            ("x-ratelimit-remaining", "1"),
            ("x-ratelimit", "abc"),
            ("x-ratelimit-reset", "100"),
        ])));
        assert_eq!(tracker.remaining(), 8);
    }

    #[test]
    fn remaining_time_never_negative() {
        let tracker = RateLimitTracker::new(8);
        tracker.record(3, 8, 1_000, 2_000_000);
        assert_eq!(tracker.snapshot().remaining_time, 0);
    }

    #[test]
    fn wait_owed_at_or_below_threshold() {
        let tracker = RateLimitTracker::new(8);
        tracker.record(2, 30, 1_045, 1_000_000);
        assert_eq!(
            tracker.wait_before_request_at(2, 1_000),
            Some(Duration::from_secs(46))
        );
        assert_eq!(tracker.wait_before_request_at(1, 1_000), None);
    }

    #[test]
    fn wait_shrinks_as_the_clock_advances() {
        let tracker = RateLimitTracker::new(8);
        tracker.record(0, 30, 1_060, 1_000_000);
        assert_eq!(
            tracker.wait_before_request_at(2, 1_050),
            Some(Duration::from_secs(11))
        );
        assert_eq!(tracker.wait_before_request_at(2, 1_061), None);
    }

    #[test]
    fn no_wait_once_window_has_reset() {
        let tracker = RateLimitTracker::new(8);
        tracker.record(0, 30, 1_000_060, 1_000_000_000);
        assert_eq!(tracker.wait_before_request(2), None);
        assert_eq!(tracker.wait_before_request(2), None);
        assert_eq!(tracker.snapshot().remaining_time, 0);
    }

    #[test]
    fn wait_uses_live_clock_for_future_reset() {
        let tracker = RateLimitTracker::new(8);
        let now_ms = Utc::now().timestamp_millis();
        tracker.record(1, 30, now_ms / 1000 + 30, now_ms);
        let wait = tracker.wait_before_request(2).unwrap();
        assert!(wait > Duration::from_secs(20) && wait <= Duration::from_secs(31));
    }
}
