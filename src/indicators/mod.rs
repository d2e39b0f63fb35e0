// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free series transforms over closing prices. None of them
// panic on short input: an undersized series yields an empty (or shorter)
// output, and callers read the *last* element for the current value.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use bollinger::calculate_bollinger_bands;
pub use macd::calculate_macd;
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
