// =============================================================================
// Swing Point Detector
// =============================================================================
//
// A candidate at index `i` is compared with `left_bars` closes before it and
// `right_bars` closes after it:
//
//   swing high: no left neighbour  >  price[i]   and
//               no right neighbour >= price[i]
//   swing low:  no left neighbour  <  price[i]   and
//               no right neighbour <= price[i]
//
// The asymmetric tie rule means a flat top of equal prices yields exactly one
// swing point (its last bar) instead of none or several.
//
// Indices closer than `left_bars` to the start or `right_bars` to the end are
// never candidates.

use crate::types::{LevelKind, PricePoint, SwingPoint};

/// Detected swing points, each list in increasing index order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwingPoints {
    pub highs: Vec<SwingPoint>,
    pub lows: Vec<SwingPoint>,
}

/// Scan `prices` for swing highs and lows (conventionally 3 / 3 bars).
///
/// A point that qualifies as a high is not also tested as a low.
pub fn find_swing_highs_and_lows(
    prices: &[PricePoint],
    left_bars: usize,
    right_bars: usize,
) -> SwingPoints {
    let mut swings = SwingPoints::default();
    let end = prices.len().saturating_sub(right_bars);

    for i in left_bars..end {
        if is_swing_high(prices, i, left_bars, right_bars) {
            swings.highs.push(SwingPoint::new(prices[i], LevelKind::High));
        } else if is_swing_low(prices, i, left_bars, right_bars) {
            swings.lows.push(SwingPoint::new(prices[i], LevelKind::Low));
        }
    }

    swings
}

fn is_swing_high(prices: &[PricePoint], i: usize, left_bars: usize, right_bars: usize) -> bool {
    let current = prices[i].price;
    let left = &prices[i - left_bars..i];
    let right = &prices[i + 1..=i + right_bars];

    !left.iter().any(|p| p.price > current) && !right.iter().any(|p| p.price >= current)
}

fn is_swing_low(prices: &[PricePoint], i: usize, left_bars: usize, right_bars: usize) -> bool {
    let current = prices[i].price;
    let left = &prices[i - left_bars..i];
    let right = &prices[i + 1..=i + right_bars];

    !left.iter().any(|p| p.price < current) && !right.iter().any(|p| p.price <= current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(prices: &[f64]) -> Vec<PricePoint> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| PricePoint::new(i as i64 * 60_000, p))
            .collect()
    }

    fn indices(points: &[SwingPoint]) -> Vec<i64> {
        points.iter().map(|p| p.timestamp / 60_000).collect()
    }

    #[test]
    fn empty_input() {
        assert_eq!(find_swing_highs_and_lows(&[], 3, 3), SwingPoints::default());
    }

    #[test]
    fn series_shorter_than_window() {
        let s = series(&[1.0, 5.0, 1.0]);
        assert_eq!(find_swing_highs_and_lows(&s, 3, 3), SwingPoints::default());
    }

    #[test]
    fn single_peak() {
        let s = series(&[1.0, 2.0, 5.0, 2.0, 1.0]);
        let swings = find_swing_highs_and_lows(&s, 1, 1);
        assert_eq!(indices(&swings.highs), vec![2]);
        assert!(swings.lows.is_empty());
        assert_eq!(swings.highs[0].price, 5.0);
        assert_eq!(swings.highs[0].kind, LevelKind::High);
        assert_eq!(swings.highs[0].strength, 1.0);
        assert_eq!(swings.highs[0].volume, 0.0);
    }

    #[test]
    fn strictly_increasing_has_no_swings() {
        let prices: Vec<f64> = (1..=40).map(|x| x as f64).collect();
        let swings = find_swing_highs_and_lows(&series(&prices), 3, 3);
        assert!(swings.highs.is_empty());
        assert!(swings.lows.is_empty());
    }

    #[test]
    fn strictly_decreasing_has_no_swings() {
        let prices: Vec<f64> = (1..=40).rev().map(|x| x as f64).collect();
        let swings = find_swing_highs_and_lows(&series(&prices), 3, 3);
        assert!(swings.highs.is_empty());
        assert!(swings.lows.is_empty());
    }

    #[test]
    fn zigzag_alternates_highs_and_lows() {
        let s = series(&[100.0, 101.0, 99.0, 102.0, 98.0, 103.0, 97.0, 104.0, 96.0, 105.0]);
        let swings = find_swing_highs_and_lows(&s, 1, 1);
        assert_eq!(indices(&swings.highs), vec![1, 3, 5, 7]);
        assert_eq!(indices(&swings.lows), vec![2, 4, 6, 8]);
    }

    #[test]
    fn flat_top_flags_last_bar_only() {
        let s = series(&[1.0, 5.0, 5.0, 1.0, 0.5]);
        let swings = find_swing_highs_and_lows(&s, 1, 1);
        assert_eq!(indices(&swings.highs), vec![2]);
    }

    #[test]
    fn flat_bottom_flags_last_bar_only() {
        let s = series(&[5.0, 1.0, 1.0, 5.0, 6.0]);
        let swings = find_swing_highs_and_lows(&s, 1, 1);
        assert_eq!(indices(&swings.lows), vec![2]);
        assert!(swings.highs.is_empty());
    }

    #[test]
    fn boundary_extremes_are_not_candidates() {
        // Global max at index 0 and global min at the last index.
        let s = series(&[10.0, 3.0, 4.0, 3.0, 2.0, 1.0]);
        let swings = find_swing_highs_and_lows(&s, 1, 1);
        assert_eq!(indices(&swings.highs), vec![2]);
        assert_eq!(indices(&swings.lows), vec![1]);
    }

    #[test]
    fn wider_window_filters_minor_peaks() {
        let s = series(&[1.0, 3.0, 2.0, 4.0, 2.0, 3.0, 1.0]);
        let narrow = find_swing_highs_and_lows(&s, 1, 1);
        assert_eq!(indices(&narrow.highs), vec![1, 3, 5]);

        let wide = find_swing_highs_and_lows(&s, 3, 3);
        assert_eq!(indices(&wide.highs), vec![3]);
    }
}
