// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ), with σ the population standard deviation of
// the window. Two derived series are reported alongside:
//
//   %B        = (close - lower) / (upper - lower) * 100
//   bandwidth = (upper - lower) / middle * 100
//
// A window of identical closes collapses the bands onto that close; %B is
// then reported as PERCENT_B_FLAT and bandwidth as 0. A zero middle band
// also reports a bandwidth of 0.

use crate::types::BollingerSnapshot;

/// %B reported when `upper == lower`.
pub const PERCENT_B_FLAT: f64 = 50.0;

/// Positionally aligned band series. Element `k` describes the window ending
/// at close `period - 1 + k`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
    pub bandwidth: Vec<f64>,
    pub percent_b: Vec<f64>,
}

impl BollingerBands {
    pub fn len(&self) -> usize {
        self.middle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middle.is_empty()
    }

    /// Reading for the most recent window, `None` when there is none.
    pub fn latest(&self) -> Option<BollingerSnapshot> {
        let i = self.len().checked_sub(1)?;
        Some(BollingerSnapshot {
            upper: self.upper[i],
            middle: self.middle[i],
            lower: self.lower[i],
            percent_b: self.percent_b[i],
            bandwidth: self.bandwidth[i],
        })
    }
}

/// Calculate Bollinger Bands for every full `period` window of `closes`.
///
/// Returns empty series when `period == 0` or `closes.len() < period`.
pub fn calculate_bollinger_bands(closes: &[f64], period: usize, num_std: f64) -> BollingerBands {
    if period == 0 || closes.len() < period {
        return BollingerBands::default();
    }

    let count = closes.len() - period + 1;
    let mut bands = BollingerBands {
        upper: Vec::with_capacity(count),
        middle: Vec::with_capacity(count),
        lower: Vec::with_capacity(count),
        bandwidth: Vec::with_capacity(count),
        percent_b: Vec::with_capacity(count),
    };

    let period_f = period as f64;
    for (offset, window) in closes.windows(period).enumerate() {
        let close = closes[offset + period - 1];

        // The mean of a constant window can round away from the constant.
        let flat = window.iter().all(|&x| x == window[0]);
        let (middle, std_dev) = if flat {
            (window[0], 0.0)
        } else {
            let mean = window.iter().sum::<f64>() / period_f;
            let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period_f;
            (mean, variance.sqrt())
        };

        let upper = middle + num_std * std_dev;
        let lower = middle - num_std * std_dev;
        let range = upper - lower;

        let percent_b = if flat || range == 0.0 {
            PERCENT_B_FLAT
        } else {
            (close - lower) / range * 100.0
        };
        let bandwidth = if flat || middle == 0.0 {
            0.0
        } else {
            range / middle * 100.0
        };

        bands.upper.push(upper);
        bands.middle.push(middle);
        bands.lower.push(lower);
        bands.bandwidth.push(bandwidth);
        bands.percent_b.push(percent_b);
    }

    bands
}
