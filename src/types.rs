// =============================================================================
// Shared types used across the analysis engine and dashboard
// =============================================================================

use serde::{Deserialize, Serialize};

/// A single observed price, epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: i64,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: i64, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Traded volume at a timestamp. Matched to a [`PricePoint`] by exact
/// timestamp equality, never interpolated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumePoint {
    pub timestamp: i64,
    pub volume: f64,
}

impl VolumePoint {
    pub fn new(timestamp: i64, volume: f64) -> Self {
        Self { timestamp, volume }
    }
}

/// Whether a swing point / price level sits above (resistance) or below
/// (support) the surrounding prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelKind {
    High,
    Low,
}

/// A local extremum flagged by the swing detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub timestamp: i64,
    pub price: f64,
    pub kind: LevelKind,
    /// Volume traded at `timestamp`, 0 when no volume sample matched.
    pub volume: f64,
    pub strength: f64,
}

impl SwingPoint {
    pub fn new(point: PricePoint, kind: LevelKind) -> Self {
        Self {
            timestamp: point.timestamp,
            price: point.price,
            kind,
            volume: 0.0,
            strength: 1.0,
        }
    }
}

/// A consolidated support or resistance zone built from one or more swing
/// points of the same kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevel {
    pub price: f64,
    pub strength: f64,
    pub touches: usize,
    pub kind: LevelKind,
    pub volume: f64,
    pub max_volume: f64,
    pub first_touch: i64,
    pub last_touch: i64,
}

/// Latest MACD reading. Every field is `None` until the respective line has
/// warmed up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacdSnapshot {
    pub value: Option<f64>,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

/// Latest Bollinger Band reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BollingerSnapshot {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub percent_b: f64,
    pub bandwidth: f64,
}

/// Everything the dashboard shows about one asset's price history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSet {
    pub sma: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: MacdSnapshot,
    pub bollinger: Option<BollingerSnapshot>,
    /// Strongest first.
    pub support_levels: Vec<PriceLevel>,
    /// Strongest first.
    pub resistance_levels: Vec<PriceLevel>,
    /// Display-only stamp, equal to the `now` the analysis was run with.
    pub computed_at: i64,
}
