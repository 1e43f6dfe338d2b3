// =============================================================================
// Indicator kernels
// =============================================================================
//
// All kernels are pure functions over candle/close slices. They return
// `None` (or an empty series) when the input is too short to produce a
// trustworthy value; callers treat that as "insufficient data", never as an
// error.
// =============================================================================

pub mod atr;
pub mod cvd;
pub mod ema;
pub mod fibonacci;
pub mod rsi;
pub mod smc;

pub use atr::{adx_proxy, calculate_atr};
pub use cvd::{cvd_series, dominant_side, CvdSide};
pub use ema::{calculate_ema, ema_separation_pct};
pub use fibonacci::{fibonacci_zones, FibZones};
pub use rsi::calculate_rsi;
pub use smc::{smc_bias, SmcBias, SmcSnapshot};

/// Minimum closed candles required before the full layer stack runs.
/// Dominated by the EMA-50 trend pair; RSI(14) and ATR(14) need far less.
pub const MIN_CANDLES: usize = 50;
