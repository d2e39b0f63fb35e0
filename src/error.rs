// =============================================================================
// Analysis errors
// =============================================================================
//
// Only caller contract violations surface as errors. Short series and
// degenerate math resolve to empty or fallback values inside the indicators.

use thiserror::Error;

/// Malformed input rejected before any indicator runs.
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("non-finite price {price} at timestamp {timestamp}")]
    NonFinitePrice { timestamp: i64, price: f64 },

    #[error("invalid volume {volume} at timestamp {timestamp}")]
    InvalidVolume { timestamp: i64, volume: f64 },

    #[error("timestamps out of order at index {index}: {previous} followed by {current}")]
    OutOfOrder {
        index: usize,
        previous: i64,
        current: i64,
    },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl AnalysisError {
    pub fn invalid_param(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
