// =============================================================================
// CoinGecko REST API Client
// =============================================================================
//
// Every response is cached under a per-request key. A fresh cache entry is
// served without touching the network; a failed request falls back to the
// stale entry when one exists. HTTP 429 is retried per `RetryPolicy` and every
// response feeds the shared `RateLimitTracker`.
//
// SECURITY: the optional pro API key travels only in the `x-cg-pro-api-key`
// header and is never logged.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::rate_limit::RateLimitTracker;
use super::retry::{retry_after, RetryPolicy};
use super::{cached_or_fetch, http_client, Fetched, ResponseCache};
use crate::runtime_config::CoinGeckoConfig;
use crate::types::{PricePoint, VolumePoint};

/// Pause before a request once this few calls remain in the window.
const LOW_BUDGET_THRESHOLD: u32 = 2;

const TRENDING_CACHE_KEY: &str = "trending_coins";

// =============================================================================
// Payload types
// =============================================================================

/// Current market figures for one coin (`/coins/markets`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinMarket {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub last_updated: Option<String>,
}

#[derive(Deserialize)]
struct MarketRow {
    id: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    name: String,
    current_price: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    total_volume: Option<f64>,
    market_cap: Option<f64>,
    high_24h: Option<f64>,
    low_24h: Option<f64>,
    last_updated: Option<String>,
}

/// Price and volume history (`/coins/{id}/market_chart`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketChart {
    pub prices: Vec<PricePoint>,
    pub volumes: Vec<VolumePoint>,
}

#[derive(Deserialize)]
struct ChartBody {
    #[serde(default)]
    prices: Vec<[f64; 2]>,
    #[serde(default)]
    total_volumes: Vec<[f64; 2]>,
}

/// One entry of `/search/trending`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendingCoin {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub price_btc: Option<f64>,
    pub market_cap_rank: Option<u64>,
    pub thumb: Option<String>,
    pub large: Option<String>,
    pub price_change_percentage_24h: Option<f64>,
}

// =============================================================================
// Parsers
// =============================================================================

pub fn parse_market(body: &Value, coin: &str) -> Result<CoinMarket> {
    let first = body
        .as_array()
        .and_then(|rows| rows.first())
        .with_context(|| format!("no market data found for {coin}"))?;

    let row: MarketRow = serde_json::from_value(first.clone())
        .with_context(|| format!("malformed market row for {coin}"))?;

    let price = row
        .current_price
        .with_context(|| format!("market row for {coin} has no current_price"))?;

    Ok(CoinMarket {
        id: row.id,
        symbol: row.symbol.to_uppercase(),
        name: row.name,
        price,
        change_24h: row.price_change_percentage_24h,
        volume_24h: row.total_volume,
        market_cap: row.market_cap,
        high_24h: row.high_24h,
        low_24h: row.low_24h,
        last_updated: row.last_updated,
    })
}

pub fn parse_market_chart(body: &Value) -> Result<MarketChart> {
    let chart: ChartBody =
        serde_json::from_value(body.clone()).context("malformed market_chart response")?;

    if chart.prices.is_empty() {
        anyhow::bail!("no price data returned from market_chart");
    }

    Ok(MarketChart {
        prices: chart
            .prices
            .iter()
            .map(|[ts, price]| PricePoint::new(*ts as i64, *price))
            .collect(),
        volumes: chart
            .total_volumes
            .iter()
            .map(|[ts, volume]| VolumePoint::new(*ts as i64, *volume))
            .collect(),
    })
}

pub fn parse_trending(body: &Value) -> Result<Vec<TrendingCoin>> {
    let coins = body["coins"]
        .as_array()
        .context("trending response has no coins array")?;

    Ok(coins
        .iter()
        .filter_map(|entry| {
            let item = &entry["item"];
            Some(TrendingCoin {
                id: item["id"].as_str()?.to_string(),
                name: item["name"].as_str().unwrap_or_default().to_string(),
                symbol: item["symbol"].as_str().unwrap_or_default().to_uppercase(),
                price_btc: item["price_btc"].as_f64(),
                market_cap_rank: item["market_cap_rank"].as_u64(),
                thumb: item["thumb"].as_str().map(str::to_string),
                large: item["large"].as_str().map(str::to_string),
                price_change_percentage_24h: item["data"]["price_change_percentage_24h"]["usd"]
                    .as_f64(),
            })
        })
        .collect())
}

// =============================================================================
// Client
// =============================================================================

#[derive(Clone)]
pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
    cache: Arc<ResponseCache>,
    tracker: Arc<RateLimitTracker>,
}

impl CoinGeckoClient {
    pub fn new(
        config: &CoinGeckoConfig,
        cache: Arc<ResponseCache>,
        tracker: Arc<RateLimitTracker>,
    ) -> Result<Self> {
        let http = http_client(std::time::Duration::from_secs(config.request_timeout_secs))?;

        debug!(
            base_url = %config.base_url,
            keyed = !config.api_key.is_empty(),
            "CoinGeckoClient initialised"
        );

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry: RetryPolicy::from_config(config),
            cache,
            tracker,
        })
    }

    /// GET /coins/markets for a single coin.
    #[instrument(skip(self), name = "coingecko::fetch_market")]
    pub async fn fetch_market(&self, coin: &str) -> Result<Fetched<CoinMarket>> {
        let query = [
            ("vs_currency", "usd".to_string()),
            ("ids", coin.to_string()),
            ("price_change_percentage", "1h,24h,7d,30d,1y".to_string()),
        ];
        self.get_json("/coins/markets", &query, &format!("market_{coin}"))
            .await?
            .try_map(|body| parse_market(&body, coin))
    }

    /// GET /coins/{id}/market_chart over the last `days` days.
    #[instrument(skip(self), name = "coingecko::fetch_market_chart")]
    pub async fn fetch_market_chart(&self, coin: &str, days: u32) -> Result<Fetched<MarketChart>> {
        let query = [("vs_currency", "usd".to_string()), ("days", days.to_string())];
        let path = format!("/coins/{coin}/market_chart");
        self.get_json(&path, &query, &format!("history_{coin}_{days}d"))
            .await?
            .try_map(|body| parse_market_chart(&body))
    }

    /// GET /search/trending.
    #[instrument(skip(self), name = "coingecko::fetch_trending")]
    pub async fn fetch_trending(&self) -> Result<Fetched<Vec<TrendingCoin>>> {
        self.get_json("/search/trending", &[], TRENDING_CACHE_KEY)
            .await?
            .try_map(|body| parse_trending(&body))
    }

    // -------------------------------------------------------------------------
    // Request plumbing
    // -------------------------------------------------------------------------

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
        cache_key: &str,
    ) -> Result<Fetched<Value>> {
        cached_or_fetch(&self.cache, cache_key, || self.request_with_retry(path, query)).await
    }

    async fn request_with_retry(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            if let Some(wait) = self.tracker.wait_before_request(LOW_BUDGET_THRESHOLD) {
                warn!(wait_secs = wait.as_secs(), path, "approaching rate limit, pausing");
                tokio::time::sleep(wait).await;
            }

            let mut request = self.http.get(&url).query(query);
            if !self.api_key.is_empty() {
                request = request.header("x-cg-pro-api-key", &self.api_key);
            }

            let resp = request
                .send()
                .await
                .with_context(|| format!("GET {path} request failed"))?;

            self.tracker.update_from_headers(resp.headers());
            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS && self.retry.should_retry(attempt) {
                let delay = self.retry.retry_delay(attempt, retry_after(resp.headers()));
                warn!(
                    path,
                    attempt = attempt + 1,
                    max_retries = self.retry.max_retries,
                    delay_secs = delay.as_secs(),
                    "rate limited, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("CoinGecko GET {} returned {}: {}", path, status, body);
            }

            return resp
                .json()
                .await
                .with_context(|| format!("failed to parse CoinGecko {path} response"));
        }
    }
}
