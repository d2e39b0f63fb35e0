// =============================================================================
// Yahoo Finance Chart Client — daily equity bars for a year
// =============================================================================
//
// `/v8/finance/chart/{symbol}` returns a `meta` block with the current quote
// and parallel `timestamp` / `indicators.quote[0]` arrays. Bars with a null
// close are skipped. `SPY` is requested as the S&P 500 index `^GSPC`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use super::{cached_or_fetch, http_client, Fetched, ResponseCache};
use crate::indicators::calculate_sma;
use crate::types::{PricePoint, VolumePoint};

const BASE_URL: &str = "https://query1.finance.yahoo.com";
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Symbol actually requested from Yahoo for a configured symbol.
pub fn yahoo_symbol(symbol: &str) -> &str {
    if symbol == "SPY" {
        "^GSPC"
    } else {
        symbol
    }
}

// =============================================================================
// Payload types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityQuote {
    pub symbol: String,
    pub price: f64,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub volume: Option<f64>,
    pub previous_close: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub year_high: Option<f64>,
    pub year_low: Option<f64>,
    /// Unix ms of the last regular-market trade.
    pub timestamp: i64,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
}

/// Quote plus the daily close and volume series behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityChart {
    pub quote: EquityQuote,
    pub prices: Vec<PricePoint>,
    pub volumes: Vec<VolumePoint>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
    regular_market_volume: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_open: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    regular_market_time: Option<i64>,
    fifty_day_average: Option<f64>,
    two_hundred_day_average: Option<f64>,
}

#[derive(Deserialize, Default)]
struct QuoteArrays {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

// =============================================================================
// Parser
// =============================================================================

pub fn parse_chart(body: &Value, symbol: &str, now_ms: i64) -> Result<EquityChart> {
    let result = body["chart"]["result"]
        .as_array()
        .and_then(|r| r.first())
        .context("invalid response from Yahoo Finance")?;

    let meta: ChartMeta = serde_json::from_value(result["meta"].clone())
        .context("malformed Yahoo Finance meta block")?;
    let price = meta
        .regular_market_price
        .context("invalid market data from Yahoo Finance: no regularMarketPrice")?;

    let timestamps: Vec<i64> =
        serde_json::from_value(result["timestamp"].clone()).unwrap_or_default();
    let quote: QuoteArrays = result["indicators"]["quote"]
        .get(0)
        .map(|q| serde_json::from_value(q.clone()))
        .transpose()
        .context("malformed Yahoo Finance quote arrays")?
        .unwrap_or_default();

    let prices: Vec<PricePoint> = timestamps
        .iter()
        .zip(&quote.close)
        .filter_map(|(ts, close)| close.map(|c| PricePoint::new(ts * 1000, c)))
        .collect();
    let volumes: Vec<VolumePoint> = timestamps
        .iter()
        .zip(&quote.volume)
        .filter_map(|(ts, volume)| volume.map(|v| VolumePoint::new(ts * 1000, v)))
        .collect();

    let closes: Vec<f64> = prices.iter().map(|p| p.price).collect();
    let last_sma = |period: usize| calculate_sma(&closes, period).last().copied();

    let previous_close = meta.previous_close.or(meta.chart_previous_close);
    let change = previous_close.map(|prev| price - prev);
    let change_percent = previous_close
        .filter(|prev| *prev != 0.0)
        .map(|prev| (price - prev) / prev * 100.0);

    let quote = EquityQuote {
        symbol: symbol.to_string(),
        price,
        change,
        change_percent,
        volume: meta.regular_market_volume,
        previous_close,
        open: meta
            .regular_market_open
            .or_else(|| quote.open.last().copied().flatten()),
        high: meta.regular_market_day_high,
        low: meta.regular_market_day_low,
        year_high: meta.fifty_two_week_high,
        year_low: meta.fifty_two_week_low,
        timestamp: meta.regular_market_time.map(|t| t * 1000).unwrap_or(now_ms),
        sma50: meta.fifty_day_average.or_else(|| last_sma(50)),
        sma200: meta.two_hundred_day_average.or_else(|| last_sma(200)),
    };

    Ok(EquityChart {
        quote,
        prices,
        volumes,
    })
}

// =============================================================================
// Client
// =============================================================================

#[derive(Clone)]
pub struct YahooClient {
    http: reqwest::Client,
    base_url: String,
    cache: Arc<ResponseCache>,
}

impl YahooClient {
    pub fn new(cache: Arc<ResponseCache>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: BASE_URL.to_string(),
            cache,
        })
    }

    #[instrument(skip(self), name = "yahoo::fetch_chart")]
    pub async fn fetch_chart(&self, symbol: &str) -> Result<Fetched<EquityChart>> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let key = format!("yahoo_{symbol}");

        cached_or_fetch(&self.cache, &key, || self.request(yahoo_symbol(symbol)))
            .await?
            .try_map(|body| parse_chart(&body, symbol, now_ms))
    }

    async fn request(&self, yahoo_symbol: &str) -> Result<Value> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, yahoo_symbol);

        let resp = self
            .http
            .get(&url)
            .query(&[("interval", "1d"), ("range", "1y"), ("includePrePost", "false")])
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("GET Yahoo chart for {yahoo_symbol}"))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Yahoo Finance chart for {} returned {}", yahoo_symbol, status);
        }

        resp.json()
            .await
            .context("failed to parse Yahoo Finance response body")
    }
}
