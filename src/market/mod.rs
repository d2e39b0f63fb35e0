// =============================================================================
// Market Data Providers
// =============================================================================
//
// HTTP clients for CoinGecko, Yahoo Finance and the alternative.me Fear &
// Greed index, plus the shared response cache and rate-limit bookkeeping.
// =============================================================================

pub mod cache;
pub mod coingecko;
pub mod fear_greed;
pub mod rate_limit;
pub mod retry;
pub mod yahoo;

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

pub use cache::{CacheStats, TtlCache};
pub use coingecko::{CoinGeckoClient, CoinMarket, TrendingCoin};
pub use fear_greed::{FearGreedClient, FearGreedReading};
pub use rate_limit::{RateLimitSnapshot, RateLimitTracker};
pub use yahoo::{EquityQuote, YahooClient};

/// Shared cache of raw provider payloads.
pub type ResponseCache = TtlCache<serde_json::Value>;

const USER_AGENT: &str = concat!("market-pulse/", env!("CARGO_PKG_VERSION"));

/// A provider payload plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    /// Served from cache instead of a live request.
    pub from_cache: bool,
    /// Set when a live request failed and a stale entry was served instead.
    pub stale_error: Option<String>,
}

impl<T> Fetched<T> {
    pub fn live(data: T) -> Self {
        Self {
            data,
            from_cache: false,
            stale_error: None,
        }
    }

    pub fn cached(data: T) -> Self {
        Self {
            data,
            from_cache: true,
            stale_error: None,
        }
    }

    pub fn stale(data: T, error: impl Into<String>) -> Self {
        Self {
            data,
            from_cache: true,
            stale_error: Some(error.into()),
        }
    }

    /// Transform the payload, keeping the provenance.
    pub fn try_map<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<Fetched<U>> {
        Ok(Fetched {
            data: f(self.data)?,
            from_cache: self.from_cache,
            stale_error: self.stale_error,
        })
    }
}

/// Serve `key` from the cache while fresh; otherwise run `request`, caching
/// its payload. A failed request falls back to a stale entry if one exists.
pub async fn cached_or_fetch<F, Fut>(
    cache: &ResponseCache,
    key: &str,
    request: F,
) -> Result<Fetched<serde_json::Value>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<serde_json::Value>>,
{
    if let Some(body) = cache.get(key) {
        debug!(cache_key = key, "serving cached response");
        return Ok(Fetched::cached(body));
    }

    match request().await {
        Ok(body) => {
            cache.insert(key, body.clone());
            Ok(Fetched::live(body))
        }
        Err(err) => {
            let reason = format!("{err:#}");
            match cache.get_stale(key) {
                Some(body) => {
                    warn!(
                        cache_key = key,
                        error = %reason,
                        "request failed, serving stale response"
                    );
                    Ok(Fetched::stale(body, reason))
                }
                None => Err(err),
            }
        }
    }
}

/// Build a `reqwest::Client` with the given request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build reqwest client")
}
