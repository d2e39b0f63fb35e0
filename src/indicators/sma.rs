// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Unweighted mean of a sliding `period`-wide window.
//
//   SMA_i = (close_i + close_{i+1} + ... + close_{i+period-1}) / period
// =============================================================================

/// Compute the SMA series for `closes`.
///
/// The output has `closes.len() - period + 1` elements; element `i` is the
/// mean of `closes[i..i + period]`.
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() < period` => empty vec
pub fn calculate_sma(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let period_f = period as f64;
    closes
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period_f)
        .collect()
}
