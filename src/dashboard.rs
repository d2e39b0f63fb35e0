// =============================================================================
// Dashboard State — shared snapshot + refresh scheduler
// =============================================================================
//
// `DashboardState` is shared across all async tasks via `Arc`. It owns the
// provider clients, the response cache and the rate-limit tracker, and keeps
// the last published `DashboardData` behind a `parking_lot::RwLock`.
//
// Every refresh fetches all sources concurrently. A source that fails keeps
// its previous report, flagged `from_cache` with the error attached; with no
// previous report it publishes an error-only record instead.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::analyze;
use crate::market::fear_greed::classify;
use crate::market::{
    CoinGeckoClient, CoinMarket, EquityQuote, FearGreedClient, FearGreedReading, Fetched,
    RateLimitSnapshot, RateLimitTracker, ResponseCache, TrendingCoin, YahooClient,
};
use crate::runtime_config::RuntimeConfig;
use crate::types::IndicatorSet;

/// Fear & Greed value published when the index has never been fetched.
const NEUTRAL_FEAR_GREED: u8 = 50;

const MIN_FAILURE_RETRY: Duration = Duration::from_secs(5);
const MAX_FAILURE_RETRY: Duration = Duration::from_secs(30);
/// Fewer remaining calls than this stretches the next refresh.
const LOW_BUDGET_REMAINING: u32 = 5;

// =============================================================================
// Published reports
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinReport {
    pub id: String,
    pub market: Option<CoinMarket>,
    pub indicators: Option<IndicatorSet>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityReport {
    pub symbol: String,
    pub quote: Option<EquityQuote>,
    pub indicators: Option<IndicatorSet>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingReport {
    pub coins: Vec<TrendingCoin>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FearGreedReport {
    #[serde(flatten)]
    pub reading: FearGreedReading,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything `GET /api/dashboard` returns.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub coins: Vec<CoinReport>,
    pub equities: Vec<EquityReport>,
    pub trending: TrendingReport,
    pub fear_greed: Option<FearGreedReport>,
    pub last_updated: Option<DateTime<Utc>>,
    pub update_time_ms: u64,
}

fn cache_note<T>(fetched: &Fetched<T>) -> Option<String> {
    fetched
        .stale_error
        .as_ref()
        .map(|e| format!("Using cached data due to error: {e}"))
}

// =============================================================================
// Stale fallback
// =============================================================================

/// A report that can stand in for a failed refresh.
trait Fallback: Clone {
    fn has_data(&self) -> bool;
    fn mark_stale(&mut self, error: String);
}

impl Fallback for CoinReport {
    fn has_data(&self) -> bool {
        self.market.is_some()
    }
    fn mark_stale(&mut self, error: String) {
        self.from_cache = true;
        self.error = Some(error);
    }
}

impl Fallback for EquityReport {
    fn has_data(&self) -> bool {
        self.quote.is_some()
    }
    fn mark_stale(&mut self, error: String) {
        self.from_cache = true;
        self.error = Some(error);
    }
}

impl Fallback for TrendingReport {
    fn has_data(&self) -> bool {
        !self.coins.is_empty()
    }
    fn mark_stale(&mut self, error: String) {
        self.from_cache = true;
        self.error = Some(error);
    }
}

impl Fallback for FearGreedReport {
    fn has_data(&self) -> bool {
        true
    }
    fn mark_stale(&mut self, error: String) {
        self.from_cache = true;
        self.error = Some(error);
    }
}

fn tally<T>(failures: &mut usize, (report, failed): (T, bool)) -> T {
    if failed {
        *failures += 1;
    }
    report
}

/// Resolve one source's refresh. The flag is `true` when the fetch failed.
fn resolve<T: Fallback>(
    source: &str,
    fresh: Result<T>,
    previous: Option<&T>,
    unavailable: impl FnOnce(String) -> T,
) -> (T, bool) {
    match fresh {
        Ok(report) => (report, false),
        Err(err) => {
            let reason = format!("{err:#}");
            warn!(source, error = %reason, "source refresh failed");
            let report = match previous.filter(|p| p.has_data()) {
                Some(prev) => {
                    let mut report = prev.clone();
                    report.mark_stale(format!("Using cached data: {reason}"));
                    report
                }
                None => unavailable(format!("Failed to fetch {source} data: {reason}")),
            };
            (report, true)
        }
    }
}

// =============================================================================
// Update summary + scheduling
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSummary {
    pub sources: usize,
    pub failures: usize,
    pub elapsed: Duration,
}

impl UpdateSummary {
    /// Every source failed: treated as a failed refresh for scheduling.
    pub fn all_failed(&self) -> bool {
        self.sources > 0 && self.failures == self.sources
    }
}

/// Delay before the next refresh.
///
/// A failed refresh retries sooner, `base / 2` clamped to 5..=30 s. A nearly
/// exhausted CoinGecko budget waits for the window to reset, bounded by
/// `base ..= 2 * base`.
pub fn next_update_delay(base: Duration, failed: bool, rate_limit: &RateLimitSnapshot) -> Duration {
    if failed {
        return (base / 2).clamp(MIN_FAILURE_RETRY, MAX_FAILURE_RETRY);
    }
    if rate_limit.remaining < LOW_BUDGET_REMAINING {
        let until_reset = Duration::from_secs(rate_limit.remaining_time.max(0) as u64 + 1);
        return until_reset.max(base).min(base * 2);
    }
    base
}

// =============================================================================
// DashboardState
// =============================================================================

pub struct DashboardState {
    pub config: RuntimeConfig,
    pub data: RwLock<DashboardData>,
    pub cache: Arc<ResponseCache>,
    pub tracker: Arc<RateLimitTracker>,
    coingecko: CoinGeckoClient,
    yahoo: YahooClient,
    fear_greed: FearGreedClient,
    /// Completed refreshes since start.
    pub update_count: AtomicU64,
    pub start_time: Instant,
}

impl DashboardState {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let cache = Arc::new(ResponseCache::with_retention(
            Duration::from_secs(config.cache.ttl_secs),
            Duration::from_secs(config.cache.stale_retention_secs),
        ));
        let tracker = Arc::new(RateLimitTracker::new(config.coingecko.effective_rate_limit()));
        let timeout = Duration::from_secs(config.coingecko.request_timeout_secs);

        let coingecko = CoinGeckoClient::new(&config.coingecko, cache.clone(), tracker.clone())
            .context("failed to build CoinGecko client")?;
        let yahoo =
            YahooClient::new(cache.clone(), timeout).context("failed to build Yahoo client")?;
        let fear_greed = FearGreedClient::new(cache.clone(), timeout)
            .context("failed to build Fear & Greed client")?;

        Ok(Self {
            config,
            data: RwLock::new(DashboardData::default()),
            cache,
            tracker,
            coingecko,
            yahoo,
            fear_greed,
            update_count: AtomicU64::new(0),
            start_time: Instant::now(),
        })
    }

    pub fn snapshot(&self) -> DashboardData {
        self.data.read().clone()
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    // -------------------------------------------------------------------------
    // Per-source refresh
    // -------------------------------------------------------------------------

    async fn coin_report(&self, coin: &str, now_ms: i64) -> Result<CoinReport> {
        let market = self.coingecko.fetch_market(coin).await?;
        let chart = self
            .coingecko
            .fetch_market_chart(coin, self.config.chart_days)
            .await?;

        let indicators = analyze(
            &chart.data.prices,
            &chart.data.volumes,
            &self.config.analysis,
            now_ms,
        )
        .with_context(|| format!("indicator analysis failed for {coin}"))?;

        Ok(CoinReport {
            id: coin.to_string(),
            from_cache: market.from_cache || chart.from_cache,
            error: cache_note(&market).or_else(|| cache_note(&chart)),
            market: Some(market.data),
            indicators: Some(indicators),
        })
    }

    async fn equity_report(&self, symbol: &str, now_ms: i64) -> Result<EquityReport> {
        let chart = self.yahoo.fetch_chart(symbol).await?;

        let indicators = analyze(
            &chart.data.prices,
            &chart.data.volumes,
            &self.config.analysis,
            now_ms,
        )
        .with_context(|| format!("indicator analysis failed for {symbol}"))?;

        Ok(EquityReport {
            symbol: symbol.to_string(),
            from_cache: chart.from_cache,
            error: cache_note(&chart),
            quote: Some(chart.data.quote),
            indicators: Some(indicators),
        })
    }

    async fn trending_report(&self) -> Result<TrendingReport> {
        let trending = self.coingecko.fetch_trending().await?;
        Ok(TrendingReport {
            from_cache: trending.from_cache,
            error: cache_note(&trending),
            coins: trending.data,
        })
    }

    async fn fear_greed_report(&self) -> Result<FearGreedReport> {
        let index = self.fear_greed.fetch().await?;
        Ok(FearGreedReport {
            from_cache: index.from_cache,
            error: cache_note(&index),
            reading: index.data,
        })
    }

    // -------------------------------------------------------------------------
    // Full refresh
    // -------------------------------------------------------------------------

    /// Refresh every source concurrently and publish the result.
    pub async fn update_dashboard(&self) -> UpdateSummary {
        let started = Instant::now();

        if let Some(wait) = self.tracker.wait_before_request(0) {
            warn!(wait_secs = wait.as_secs(), "rate limit exhausted, delaying refresh");
            tokio::time::sleep(wait).await;
        }

        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let previous = self.snapshot();

        let coins = join_all(self.config.coins.iter().map(|c| self.coin_report(c, now_ms)));
        let equities = join_all(self.config.equities.iter().map(|s| self.equity_report(s, now_ms)));
        let (coin_results, equity_results, trending, fear_greed) =
            tokio::join!(coins, equities, self.trending_report(), self.fear_greed_report());

        let mut failures = 0;

        let coins: Vec<CoinReport> = self
            .config
            .coins
            .iter()
            .zip(coin_results)
            .map(|(id, fresh)| {
                let prev = previous.coins.iter().find(|c| &c.id == id);
                let resolved = resolve(id, fresh, prev, |error| CoinReport {
                    id: id.clone(),
                    market: None,
                    indicators: None,
                    from_cache: false,
                    error: Some(error),
                });
                tally(&mut failures, resolved)
            })
            .collect();

        let equities: Vec<EquityReport> = self
            .config
            .equities
            .iter()
            .zip(equity_results)
            .map(|(symbol, fresh)| {
                let prev = previous.equities.iter().find(|e| &e.symbol == symbol);
                let resolved = resolve(symbol, fresh, prev, |error| EquityReport {
                    symbol: symbol.clone(),
                    quote: None,
                    indicators: None,
                    from_cache: false,
                    error: Some(error),
                });
                tally(&mut failures, resolved)
            })
            .collect();

        let resolved = resolve(
            "trending coins",
            trending,
            Some(&previous.trending),
            |error| TrendingReport {
                coins: Vec::new(),
                from_cache: false,
                error: Some(error),
            },
        );
        let trending = tally(&mut failures, resolved);

        let resolved = resolve(
            "Fear & Greed Index",
            fear_greed,
            previous.fear_greed.as_ref(),
            |error| FearGreedReport {
                reading: FearGreedReading {
                    value: NEUTRAL_FEAR_GREED,
                    value_classification: classify(NEUTRAL_FEAR_GREED).to_string(),
                    timestamp: now_ms,
                },
                from_cache: false,
                error: Some(error),
            },
        );
        let fear_greed = tally(&mut failures, resolved);

        let elapsed = started.elapsed();
        let sources = coins.len() + equities.len() + 2;

        *self.data.write() = DashboardData {
            coins,
            equities,
            trending,
            fear_greed: Some(fear_greed),
            last_updated: Some(now),
            update_time_ms: elapsed.as_millis() as u64,
        };
        self.update_count.fetch_add(1, Ordering::Relaxed);

        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            sources,
            failures,
            rate_limit_remaining = self.tracker.remaining(),
            "dashboard updated"
        );

        UpdateSummary {
            sources,
            failures,
            elapsed,
        }
    }
}

/// Refresh the dashboard forever, pacing each round with
/// [`next_update_delay`].
pub async fn run_scheduler(state: Arc<DashboardState>) {
    let base = Duration::from_millis(state.config.update_interval_ms);

    loop {
        let summary = state.update_dashboard().await;

        let purged = state.cache.purge_expired();
        if purged > 0 {
            info!(purged, "expired cache entries removed");
        }

        let rate_limit = state.tracker.snapshot();
        let delay = next_update_delay(base, summary.all_failed(), &rate_limit);
        if summary.all_failed() {
            warn!(retry_secs = delay.as_secs(), "every source failed, retrying sooner");
        } else if delay != base {
            info!(
                remaining = rate_limit.remaining,
                next_update_secs = delay.as_secs(),
                "rate limit low, stretching refresh interval"
            );
        }

        tokio::time::sleep(delay).await;
    }
}
