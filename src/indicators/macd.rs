// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   macd[i]      = EMA_fast[i] - EMA_slow[i]                 (every index)
//   signal       = EMA_signal(macd[slow-1..])                (slow EMA warm)
//   histogram[i] = macd[i] - signal[i]
//
// The signal EMA starts at index `slow - 1` and is reported only once it has
// itself consumed `signal` MACD values, i.e. from index `slow + signal - 2`.
// Earlier indices are `None`. All three arrays keep the input's length so a
// caller can index them with the same position as the closes.
// =============================================================================

use super::ema::calculate_ema;

/// Positionally aligned MACD output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

impl MacdSeries {
    /// Most recent MACD line value.
    pub fn last_macd(&self) -> Option<f64> {
        self.macd.last().copied()
    }

    /// Most recent signal value; `None` while the signal line is warming up.
    pub fn last_signal(&self) -> Option<f64> {
        self.signal.last().copied().flatten()
    }

    /// Most recent histogram value; `None` while the signal line is warming up.
    pub fn last_histogram(&self) -> Option<f64> {
        self.histogram.last().copied().flatten()
    }
}

/// Compute MACD with the given `fast`, `slow` and `signal` periods
/// (conventionally 12 / 26 / 9).
///
/// # Edge cases
/// - empty input or any zero period => empty series
/// - fewer than `slow + signal - 1` closes => MACD line populated, signal and
///   histogram all `None`
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    if closes.is_empty() || fast == 0 || slow == 0 || signal == 0 {
        return MacdSeries::default();
    }

    let fast_ema = calculate_ema(closes, fast);
    let slow_ema = calculate_ema(closes, slow);
    let macd: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();

    let n = macd.len();
    let start = slow - 1;
    let first_reported = slow + signal - 2;

    let mut signal_line = vec![None; n];
    if start < n {
        let signal_ema = calculate_ema(&macd[start..], signal);
        for (j, value) in signal_ema.into_iter().enumerate() {
            let i = start + j;
            if i >= first_reported {
                signal_line[i] = Some(value);
            }
        }
    }

    let histogram = macd
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| s.map(|s| m - s))
        .collect();

    MacdSeries {
        macd,
        signal: signal_line,
        histogram,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn macd_empty_input() {
        assert_eq!(calculate_macd(&[], 12, 26, 9), MacdSeries::default());
    }

    #[test]
    fn macd_zero_period() {
        assert!(calculate_macd(&[1.0, 2.0], 0, 26, 9).macd.is_empty());
    }

    #[test]
    fn macd_arrays_aligned_with_input() {
        let closes = wave(60);
        let m = calculate_macd(&closes, 12, 26, 9);
        assert_eq!(m.macd.len(), 60);
        assert_eq!(m.signal.len(), 60);
        assert_eq!(m.histogram.len(), 60);
    }

    #[test]
    fn macd_signal_warmup_boundary() {
        let closes = wave(60);
        let m = calculate_macd(&closes, 12, 26, 9);
        // slow + signal - 2 = 33
        assert!(m.signal[..33].iter().all(Option::is_none));
        assert!(m.signal[33..].iter().all(Option::is_some));
    }

    #[test]
    fn macd_short_series_has_no_signal() {
        let closes = wave(30);
        let m = calculate_macd(&closes, 12, 26, 9);
        assert_eq!(m.macd.len(), 30);
        assert!(m.last_macd().is_some());
        assert!(m.last_signal().is_none());
        assert!(m.last_histogram().is_none());
    }

    #[test]
    fn macd_histogram_is_macd_minus_signal() {
        let closes = wave(80);
        let m = calculate_macd(&closes, 12, 26, 9);
        for i in 0..closes.len() {
            match (m.signal[i], m.histogram[i]) {
                (Some(s), Some(h)) => assert!((h - (m.macd[i] - s)).abs() < 1e-10),
                (None, None) => {}
                other => panic!("signal/histogram definedness differs at {i}: {other:?}"),
            }
        }
    }

    #[test]
    fn macd_signal_matches_ema_of_warm_macd() {
        let closes = wave(50);
        let m = calculate_macd(&closes, 3, 6, 4);
        let sig = calculate_ema(&m.macd[5..], 4);
        // First reported index = 6 + 4 - 2 = 8, i.e. sig[3].
        assert!((m.signal[8].unwrap() - sig[3]).abs() < 1e-10);
        assert!((m.last_signal().unwrap() - *sig.last().unwrap()).abs() < 1e-10);
    }

    #[test]
    fn macd_constant_series_is_flat() {
        let closes = vec![50.0; 40];
        let m = calculate_macd(&closes, 12, 26, 9);
        assert!(m.macd.iter().all(|v| v.abs() < 1e-10));
        assert!(m.last_histogram().unwrap().abs() < 1e-10);
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let closes: Vec<f64> = (1..=60).map(|x| x as f64).collect();
        let m = calculate_macd(&closes, 12, 26, 9);
        assert!(m.last_macd().unwrap() > 0.0);
    }
}
