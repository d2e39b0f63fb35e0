// =============================================================================
// Support / Resistance Levels
// =============================================================================
//
// Two-stage pipeline over a time-ordered price series:
//
//   1. `swing`   — flag local highs and lows with a left/right window scan.
//   2. `cluster` — merge nearby swing points of one kind into price levels,
//                  weighted by volume and recency, and score their strength.

pub mod cluster;
pub mod swing;

pub use cluster::{attach_volume, group_price_levels, ClusterOptions};
pub use swing::find_swing_highs_and_lows;
