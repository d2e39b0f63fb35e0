// =============================================================================
// Price-Level Clustering
// =============================================================================
//
// Merges swing points of one kind into support/resistance levels.
//
// Grouping is a single greedy pass over the points sorted by price. A point
// joins the open group when its relative distance to the group's most
// recently added member is within `threshold`:
//
//   |price - last.price| / last.price <= threshold
//
// Membership is chained: a group may drift well past `threshold` of its first
// member as long as every consecutive step stays inside it.
//
// Per group:
//   weight    = volume * decay | volume | decay | 1   (per enabled options)
//   decay     = 0.5 ^ (age_ms / half_life_ms)
//   price     = weight-weighted mean (arithmetic mean when not volume
//               weighted, or when every weight is zero)
//   strength  = sqrt(touches) * (log10(max_volume + 1) * 0.5 + 1) * penalty
//   penalty   = 1.0 when volume weighted, else 0.8
//
// Levels are returned strongest first.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{PriceLevel, SwingPoint, VolumePoint};

/// Thirty days in milliseconds.
pub const DEFAULT_HALF_LIFE_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Strength multiplier applied when levels are not volume weighted.
const UNWEIGHTED_PENALTY: f64 = 0.8;

fn default_threshold() -> f64 {
    0.01
}

fn default_true() -> bool {
    true
}

fn default_half_life_ms() -> i64 {
    DEFAULT_HALF_LIFE_MS
}

/// Tunables for [`group_price_levels`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterOptions {
    /// Maximum relative distance between neighbouring members (0.01 = 1%).
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_true")]
    pub volume_weighted: bool,

    #[serde(default = "default_true")]
    pub time_decay: bool,

    #[serde(default = "default_half_life_ms")]
    pub half_life_ms: i64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            volume_weighted: true,
            time_decay: true,
            half_life_ms: DEFAULT_HALF_LIFE_MS,
        }
    }
}

/// Fill each point's `volume` from the sample with the identical timestamp,
/// or 0 when none matches.
pub fn attach_volume(points: &[SwingPoint], volumes: &[VolumePoint]) -> Vec<SwingPoint> {
    let by_timestamp: HashMap<i64, f64> =
        volumes.iter().map(|v| (v.timestamp, v.volume)).collect();

    points
        .iter()
        .map(|p| SwingPoint {
            volume: by_timestamp.get(&p.timestamp).copied().unwrap_or(0.0),
            ..*p
        })
        .collect()
}

/// Exponential half-life decay of an observation made at `timestamp_ms`,
/// seen from `now_ms`.
///
/// Returns a factor in `(0, 1]`. Timestamps in the future count as fresh, and a
/// non-positive half-life disables decay.
pub fn time_decay_factor(timestamp_ms: i64, now_ms: i64, half_life_ms: i64) -> f64 {
    if half_life_ms <= 0 {
        return 1.0;
    }
    let age_ms = now_ms.saturating_sub(timestamp_ms).max(0);
    0.5_f64.powf(age_ms as f64 / half_life_ms as f64)
}

/// Cluster `levels` (all of one kind) into price levels, strongest first.
///
/// `now_ms` is the reference time for decay weighting.
pub fn group_price_levels(
    levels: &[SwingPoint],
    options: &ClusterOptions,
    now_ms: i64,
) -> Vec<PriceLevel> {
    if levels.is_empty() {
        return Vec::new();
    }

    let mut sorted = levels.to_vec();
    sorted.sort_by(|a, b| a.price.total_cmp(&b.price));

    let mut result = Vec::new();
    let mut group: Vec<SwingPoint> = vec![sorted[0]];

    for &level in &sorted[1..] {
        // `group` is never empty here.
        let last = group[group.len() - 1].price;
        if within_threshold(level.price, last, options.threshold) {
            group.push(level);
        } else {
            result.push(summarise_group(&group, options, now_ms));
            group = vec![level];
        }
    }
    result.push(summarise_group(&group, options, now_ms));

    result.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    result
}

fn within_threshold(price: f64, last: f64, threshold: f64) -> bool {
    if last == 0.0 {
        return price == 0.0;
    }
    ((price - last) / last).abs() <= threshold
}

fn summarise_group(group: &[SwingPoint], options: &ClusterOptions, now_ms: i64) -> PriceLevel {
    let touches = group.len();

    let mut total_weight = 0.0;
    let mut weighted_price = 0.0;
    let mut total_volume = 0.0;
    let mut max_volume = 0.0_f64;
    let mut first_touch = i64::MAX;
    let mut last_touch = i64::MIN;

    for point in group {
        let decay = if options.time_decay {
            time_decay_factor(point.timestamp, now_ms, options.half_life_ms)
        } else {
            1.0
        };
        let weight = if options.volume_weighted {
            point.volume * decay
        } else {
            decay
        };

        total_weight += weight;
        weighted_price += point.price * weight;
        total_volume += point.volume;
        max_volume = max_volume.max(point.volume);
        first_touch = first_touch.min(point.timestamp);
        last_touch = last_touch.max(point.timestamp);
    }

    let mean_price = group.iter().map(|p| p.price).sum::<f64>() / touches as f64;
    let price = if options.volume_weighted && total_weight > 0.0 {
        weighted_price / total_weight
    } else {
        mean_price
    };

    let penalty = if options.volume_weighted {
        1.0
    } else {
        UNWEIGHTED_PENALTY
    };
    let strength = (touches as f64).sqrt() * ((max_volume + 1.0).log10() * 0.5 + 1.0) * penalty;

    PriceLevel {
        price,
        strength,
        touches,
        kind: group[0].kind,
        volume: total_volume,
        max_volume,
        first_touch,
        last_touch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LevelKind, PricePoint};

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn point(ts: i64, price: f64, volume: f64) -> SwingPoint {
        SwingPoint {
            volume,
            ..SwingPoint::new(PricePoint::new(ts, price), LevelKind::High)
        }
    }

    fn plain() -> ClusterOptions {
        ClusterOptions {
            threshold: 0.01,
            volume_weighted: false,
            time_decay: false,
            half_life_ms: DEFAULT_HALF_LIFE_MS,
        }
    }

    #[test]
    fn empty_input() {
        assert!(group_price_levels(&[], &ClusterOptions::default(), 0).is_empty());
    }

    #[test]
    fn default_options() {
        let o = ClusterOptions::default();
        assert_eq!(o.threshold, 0.01);
        assert!(o.volume_weighted);
        assert!(o.time_decay);
        assert_eq!(o.half_life_ms, 2_592_000_000);
    }

    #[test]
    fn options_deserialise_with_defaults() {
        let o: ClusterOptions = serde_json::from_str(r#"{ "threshold": 0.5 }"#).unwrap();
        assert_eq!(o.threshold, 0.5);
        assert!(o.volume_weighted);
        assert_eq!(o.half_life_ms, DEFAULT_HALF_LIFE_MS);
    }

    #[test]
    fn attach_volume_matches_exact_timestamps() {
        let points = vec![
            point(1_000, 10.0, 0.0),
            point(2_000, 11.0, 0.0),
            point(3_000, 12.0, 0.0),
        ];
        let volumes = vec![
            VolumePoint::new(1_000, 5.0),
            VolumePoint::new(2_500, 7.0),
            VolumePoint::new(3_000, 9.0),
        ];
        let out = attach_volume(&points, &volumes);
        assert_eq!(out[0].volume, 5.0);
        assert_eq!(out[1].volume, 0.0);
        assert_eq!(out[2].volume, 9.0);
        assert_eq!(out[1].price, 11.0);
    }

    #[test]
    fn decay_half_life() {
        let now = 100 * DAY_MS;
        assert!((time_decay_factor(now, now, DEFAULT_HALF_LIFE_MS) - 1.0).abs() < 1e-12);
        let month = time_decay_factor(now - 30 * DAY_MS, now, DEFAULT_HALF_LIFE_MS);
        let two_months = time_decay_factor(now - 60 * DAY_MS, now, DEFAULT_HALF_LIFE_MS);
        assert!((month - 0.5).abs() < 1e-12);
        assert!((two_months - 0.25).abs() < 1e-12);
    }

    #[test]
    fn decay_future_and_disabled() {
        assert_eq!(time_decay_factor(2_000, 1_000, DEFAULT_HALF_LIFE_MS), 1.0);
        assert_eq!(time_decay_factor(0, 1_000_000, 0), 1.0);
    }

    #[test]
    fn single_point_group() {
        let levels = group_price_levels(&[point(5, 100.0, 0.0)], &plain(), 10);
        assert_eq!(levels.len(), 1);
        let l = &levels[0];
        assert_eq!(l.price, 100.0);
        assert_eq!(l.touches, 1);
        assert_eq!(l.first_touch, 5);
        assert_eq!(l.last_touch, 5);
        assert_eq!(l.kind, LevelKind::High);
        // sqrt(1) * (log10(1) * 0.5 + 1) * 0.8
        assert!((l.strength - 0.8).abs() < 1e-12);
    }

    #[test]
    fn splits_distant_prices() {
        let pts = vec![point(1, 100.0, 0.0), point(2, 100.5, 0.0), point(3, 120.0, 0.0)];
        let levels = group_price_levels(&pts, &plain(), 0);
        assert_eq!(levels.len(), 2);
        // Two-touch group is stronger, so it comes first.
        assert_eq!(levels[0].touches, 2);
        assert!((levels[0].price - 100.25).abs() < 1e-10);
        assert_eq!(levels[1].touches, 1);
        assert_eq!(levels[1].price, 120.0);
    }

    #[test]
    fn chained_threshold_drifts_past_anchor() {
        // Each step is < 1% but the ends are ~2.4% apart.
        let pts = vec![
            point(1, 100.0, 0.0),
            point(2, 100.8, 0.0),
            point(3, 101.6, 0.0),
            point(4, 102.4, 0.0),
        ];
        let levels = group_price_levels(&pts, &plain(), 0);
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].touches, 4);
    }

    #[test]
    fn input_order_does_not_matter() {
        let a = vec![point(1, 101.0, 3.0), point(2, 100.0, 1.0), point(3, 150.0, 2.0)];
        let mut b = a.clone();
        b.reverse();
        let opts = ClusterOptions::default();
        assert_eq!(group_price_levels(&a, &opts, 10), group_price_levels(&b, &opts, 10));
    }

    #[test]
    fn volume_weighted_price() {
        let opts = ClusterOptions {
            time_decay: false,
            ..ClusterOptions::default()
        };
        let pts = vec![point(1, 100.0, 3.0), point(2, 100.4, 1.0)];
        let levels = group_price_levels(&pts, &opts, 0);
        assert_eq!(levels.len(), 1);
        assert!((levels[0].price - 100.1).abs() < 1e-10);
        assert_eq!(levels[0].volume, 4.0);
        assert_eq!(levels[0].max_volume, 3.0);
    }

    #[test]
    fn zero_volume_falls_back_to_mean() {
        let opts = ClusterOptions::default();
        let pts = vec![point(1, 100.0, 0.0), point(2, 100.4, 0.0)];
        let levels = group_price_levels(&pts, &opts, 0);
        assert!((levels[0].price - 100.2).abs() < 1e-10);
    }

    #[test]
    fn time_decay_favours_recent_touches() {
        let now = 60 * DAY_MS;
        let opts = ClusterOptions {
            volume_weighted: true,
            time_decay: true,
            ..ClusterOptions::default()
        };
        // Equal volume; the older touch is one half-life old.
        let pts = vec![point(now - 30 * DAY_MS, 100.0, 10.0), point(now, 100.6, 10.0)];
        let levels = group_price_levels(&pts, &opts, now);
        // (100 * 0.5 + 100.6 * 1) / 1.5
        let expected = (100.0 * 0.5 + 100.6) / 1.5;
        assert!((levels[0].price - expected).abs() < 1e-10);
    }

    #[test]
    fn decay_only_weights_by_recency() {
        let now = 30 * DAY_MS;
        let opts = ClusterOptions {
            volume_weighted: false,
            time_decay: true,
            ..ClusterOptions::default()
        };
        let pts = vec![point(0, 100.0, 99.0), point(now, 100.6, 1.0)];
        let levels = group_price_levels(&pts, &opts, now);
        // Not volume weighted => plain mean regardless of decay.
        assert!((levels[0].price - 100.3).abs() < 1e-10);
        assert!(levels[0].strength < (2.0_f64).sqrt() * (100.0_f64.log10() * 0.5 + 1.0));
    }

    #[test]
    fn strength_formula() {
        let opts = ClusterOptions {
            time_decay: false,
            ..ClusterOptions::default()
        };
        let pts = vec![
            point(1, 50.0, 999.0),
            point(2, 50.1, 99.0),
            point(3, 50.2, 9.0),
            point(4, 50.3, 0.0),
        ];
        let levels = group_price_levels(&pts, &opts, 0);
        assert_eq!(levels.len(), 1);
        // sqrt(4) * (log10(1000) * 0.5 + 1) = 2 * 2.5
        assert!((levels[0].strength - 5.0).abs() < 1e-10);
        assert_eq!(levels[0].first_touch, 1);
        assert_eq!(levels[0].last_touch, 4);
    }

    #[test]
    fn output_sorted_by_strength_descending() {
        let pts = vec![
            point(1, 10.0, 5.0),
            point(2, 20.0, 5000.0),
            point(3, 20.1, 10.0),
            point(4, 30.0, 50.0),
            point(5, 40.0, 0.0),
            point(6, 40.2, 0.0),
            point(7, 40.3, 0.0),
        ];
        let levels = group_price_levels(&pts, &ClusterOptions::default(), 10);
        assert_eq!(levels.len(), 4);
        for pair in levels.windows(2) {
            assert!(pair[0].strength >= pair[1].strength);
        }
    }

    #[test]
    fn regrouping_merged_level_is_stable() {
        let opts = ClusterOptions::default();
        let now = 10 * DAY_MS;
        let pts = vec![
            point(DAY_MS, 100.0, 10.0),
            point(2 * DAY_MS, 100.5, 20.0),
            point(3 * DAY_MS, 100.9, 5.0),
        ];
        let first = group_price_levels(&pts, &opts, now);
        assert_eq!(first.len(), 1);

        let merged: Vec<SwingPoint> = first
            .iter()
            .map(|l| point(l.last_touch, l.price, l.max_volume))
            .collect();
        let second = group_price_levels(&merged, &opts, now);
        assert_eq!(second.len(), 1);
        assert!((second[0].price - first[0].price).abs() < 1e-10);
        assert_eq!(second[0].touches, 1);
    }

    #[test]
    fn zero_price_members_do_not_divide_by_zero() {
        let pts = vec![point(1, 0.0, 0.0), point(2, 0.0, 0.0), point(3, 1.0, 0.0)];
        let levels = group_price_levels(&pts, &plain(), 0);
        assert_eq!(levels.len(), 2);
        assert!(levels.iter().all(|l| l.price.is_finite()));
    }
}
