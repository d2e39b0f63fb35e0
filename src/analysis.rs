// =============================================================================
// Indicator Assembly
// =============================================================================
//
// Runs every indicator over one asset's price history and keeps only the most
// recent reading of each, plus the full support/resistance level lists.
//
// Input is validated up front: a non-finite price, a negative or non-finite
// volume, out-of-order timestamps, or nonsensical parameters abort the
// analysis with an `AnalysisError`. A series that is merely too short is not
// an error; the affected fields come back as `None` / empty.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AnalysisError;
use crate::indicators::{calculate_bollinger_bands, calculate_macd, calculate_rsi, calculate_sma};
use crate::levels::{attach_volume, find_swing_highs_and_lows, group_price_levels, ClusterOptions};
use crate::types::{IndicatorSet, MacdSnapshot, PricePoint, VolumePoint};

// =============================================================================
// Parameters
// =============================================================================

fn default_sma_period() -> usize {
    50
}

fn default_rsi_period() -> usize {
    14
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

fn default_bollinger_period() -> usize {
    20
}

fn default_bollinger_std_dev() -> f64 {
    2.0
}

fn default_swing_bars() -> usize {
    3
}

/// Every tunable used by [`analyze`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    #[serde(default = "default_sma_period")]
    pub sma_period: usize,

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,

    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,

    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,

    #[serde(default = "default_bollinger_period")]
    pub bollinger_period: usize,

    /// Band distance from the middle, in standard deviations.
    #[serde(default = "default_bollinger_std_dev")]
    pub bollinger_std_dev: f64,

    #[serde(default = "default_swing_bars")]
    pub swing_left_bars: usize,

    #[serde(default = "default_swing_bars")]
    pub swing_right_bars: usize,

    #[serde(default)]
    pub cluster: ClusterOptions,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            sma_period: default_sma_period(),
            rsi_period: default_rsi_period(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            bollinger_period: default_bollinger_period(),
            bollinger_std_dev: default_bollinger_std_dev(),
            swing_left_bars: default_swing_bars(),
            swing_right_bars: default_swing_bars(),
            cluster: ClusterOptions::default(),
        }
    }
}

impl AnalysisParams {
    /// Reject parameter combinations the indicators cannot meaningfully use.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let periods = [
            ("sma_period", self.sma_period),
            ("rsi_period", self.rsi_period),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("bollinger_period", self.bollinger_period),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(AnalysisError::invalid_param(name, "must be at least 1"));
            }
        }

        if self.macd_fast >= self.macd_slow {
            return Err(AnalysisError::invalid_param(
                "macd_fast",
                format!("must be below macd_slow ({} >= {})", self.macd_fast, self.macd_slow),
            ));
        }
        if !self.bollinger_std_dev.is_finite() || self.bollinger_std_dev < 0.0 {
            return Err(AnalysisError::invalid_param(
                "bollinger_std_dev",
                format!("must be finite and non-negative, got {}", self.bollinger_std_dev),
            ));
        }
        if !self.cluster.threshold.is_finite() || self.cluster.threshold < 0.0 {
            return Err(AnalysisError::invalid_param(
                "cluster.threshold",
                format!("must be finite and non-negative, got {}", self.cluster.threshold),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Input validation
// =============================================================================

/// Check that `prices` is finite and ascending, and `volumes` finite and
/// non-negative. Equal consecutive timestamps are allowed.
pub fn validate_series(
    prices: &[PricePoint],
    volumes: &[VolumePoint],
) -> Result<(), AnalysisError> {
    for (index, point) in prices.iter().enumerate() {
        if !point.price.is_finite() {
            return Err(AnalysisError::NonFinitePrice {
                timestamp: point.timestamp,
                price: point.price,
            });
        }
        if index > 0 {
            let previous = prices[index - 1].timestamp;
            if point.timestamp < previous {
                return Err(AnalysisError::OutOfOrder {
                    index,
                    previous,
                    current: point.timestamp,
                });
            }
        }
    }

    if let Some(bad) = volumes.iter().find(|v| !v.volume.is_finite() || v.volume < 0.0) {
        return Err(AnalysisError::InvalidVolume {
            timestamp: bad.timestamp,
            volume: bad.volume,
        });
    }

    Ok(())
}

// =============================================================================
// Assembly
// =============================================================================

/// Compute the full [`IndicatorSet`] for one asset.
///
/// `now_ms` drives level time-decay and is stamped into `computed_at`.
pub fn analyze(
    prices: &[PricePoint],
    volumes: &[VolumePoint],
    params: &AnalysisParams,
    now_ms: i64,
) -> Result<IndicatorSet, AnalysisError> {
    params.validate()?;
    validate_series(prices, volumes)?;

    let closes: Vec<f64> = prices.iter().map(|p| p.price).collect();

    let sma = calculate_sma(&closes, params.sma_period).last().copied();
    let rsi = calculate_rsi(&closes, params.rsi_period).last().copied();

    let macd_series = calculate_macd(
        &closes,
        params.macd_fast,
        params.macd_slow,
        params.macd_signal,
    );
    let macd = MacdSnapshot {
        value: macd_series.last_macd(),
        signal: macd_series.last_signal(),
        histogram: macd_series.last_histogram(),
    };

    let bollinger = calculate_bollinger_bands(
        &closes,
        params.bollinger_period,
        params.bollinger_std_dev,
    )
    .latest();

    let swings = find_swing_highs_and_lows(prices, params.swing_left_bars, params.swing_right_bars);
    let support_levels =
        group_price_levels(&attach_volume(&swings.lows, volumes), &params.cluster, now_ms);
    let resistance_levels =
        group_price_levels(&attach_volume(&swings.highs, volumes), &params.cluster, now_ms);

    debug!(
        points = prices.len(),
        swing_highs = swings.highs.len(),
        swing_lows = swings.lows.len(),
        support = support_levels.len(),
        resistance = resistance_levels.len(),
        "indicator set computed"
    );

    Ok(IndicatorSet {
        sma,
        rsi,
        macd,
        bollinger,
        support_levels,
        resistance_levels,
        computed_at: now_ms,
    })
}
