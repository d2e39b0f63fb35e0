// =============================================================================
// Relative Strength Index (RSI) — trailing-window averages
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// For every close `i >= period`:
//   Step 1 — Take the `period` deltas ending at `i`
//            (delta_j = close_j - close_{j-1}).
//   Step 2 — avg_gain = sum(positive deltas) / period
//            avg_loss = sum(|negative deltas|) / period
//   Step 3 — RS  = avg_gain / avg_loss   (RS = 100 when avg_loss == 0)
//            RSI = 100 - 100 / (1 + RS)
//
// Each window is averaged independently (no Wilder smoothing), so a value
// depends only on the last `period + 1` closes.
// =============================================================================

/// RS substituted when a window has no losses. Keeps RSI finite (~99.01)
/// instead of dividing by zero.
pub const ZERO_LOSS_RS: f64 = 100.0;

/// Compute the full RSI series for the given `closes` and `period`.
///
/// The returned vector has `closes.len() - period` values; value `k`
/// corresponds to close `period + k`.
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() <= period` => empty vec (need at least `period` deltas)
/// - If average loss is zero, RS is taken as [`ZERO_LOSS_RS`].
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let period_f = period as f64;

    deltas
        .windows(period)
        .map(|window| {
            let (gains, losses) = window.iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
                if d > 0.0 {
                    (g + d, l)
                } else {
                    (g, l - d)
                }
            });
            rsi_from_averages(gains / period_f, losses / period_f)
        })
        .collect()
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    let rs = if avg_loss == 0.0 {
        ZERO_LOSS_RS
    } else {
        avg_gain / avg_loss
    };
    100.0 - 100.0 / (1.0 + rs)
}
