// =============================================================================
// Fear & Greed Index — crypto market sentiment from alternative.me
// =============================================================================
//
// The index is a single 0..=100 reading. When the provider omits its label
// the classification is derived from the value:
//
//   value >= 75  =>  Extreme Greed
//   value >= 60  =>  Greed
//   value >= 45  =>  Neutral
//   value >= 25  =>  Fear
//   otherwise    =>  Extreme Fear

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use super::{cached_or_fetch, http_client, Fetched, ResponseCache};

const FNG_URL: &str = "https://api.alternative.me/fng/";
const CACHE_KEY: &str = "fear_greed_index";

/// Current index reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FearGreedReading {
    pub value: u8,
    pub value_classification: String,
    /// Unix ms the reading applies to.
    pub timestamp: i64,
}

pub fn classify(value: u8) -> &'static str {
    match value {
        75..=u8::MAX => "Extreme Greed",
        60..=74 => "Greed",
        45..=59 => "Neutral",
        25..=44 => "Fear",
        _ => "Extreme Fear",
    }
}

/// The API sends numbers as strings; accept either form.
fn as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

pub fn parse_fear_greed(body: &Value, now_ms: i64) -> Result<FearGreedReading> {
    let entry = body["data"]
        .as_array()
        .and_then(|data| data.first())
        .context("invalid response from Fear & Greed API")?;

    let raw = as_i64(&entry["value"]).context("Fear & Greed entry has no numeric value")?;
    let value = u8::try_from(raw)
        .ok()
        .filter(|v| *v <= 100)
        .with_context(|| format!("Fear & Greed value {raw} outside 0..=100"))?;

    let value_classification = entry["value_classification"]
        .as_str()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| classify(value))
        .to_string();

    let timestamp = as_i64(&entry["timestamp"])
        .map(|secs| secs * 1000)
        .unwrap_or(now_ms);

    Ok(FearGreedReading {
        value,
        value_classification,
        timestamp,
    })
}

#[derive(Clone)]
pub struct FearGreedClient {
    http: reqwest::Client,
    url: String,
    cache: Arc<ResponseCache>,
}

impl FearGreedClient {
    pub fn new(cache: Arc<ResponseCache>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            url: FNG_URL.to_string(),
            cache,
        })
    }

    #[instrument(skip(self), name = "fear_greed::fetch")]
    pub async fn fetch(&self) -> Result<Fetched<FearGreedReading>> {
        let now_ms = chrono::Utc::now().timestamp_millis();

        cached_or_fetch(&self.cache, CACHE_KEY, || self.request())
            .await?
            .try_map(|body| parse_fear_greed(&body, now_ms))
    }

    async fn request(&self) -> Result<Value> {
        let resp = self
            .http
            .get(&self.url)
            .query(&[("limit", "1"), ("format", "json")])
            .send()
            .await
            .context("GET Fear & Greed index")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Fear & Greed API returned {}", status);
        }

        resp.json()
            .await
            .context("failed to parse Fear & Greed response body")
    }
}
