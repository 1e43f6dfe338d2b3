// =============================================================================
// Fibonacci Retracement Zones
// =============================================================================
//
// From the most recent swing high / swing low pair, compute the classic
// retracement levels 0.236 / 0.382 / 0.5 / 0.618 / 0.786 and the "golden
// zone" [0.618, 0.786]. Whichever swing came later decides the leg
// direction: low-then-high is an up leg (retracements measured down from
// the high), high-then-low a down leg.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::indicators::smc::find_swings;
use crate::market_data::Candle;

pub const FIB_RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];

/// One retracement level of the active leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibLevel {
    pub ratio: f64,
    pub price: f64,
}

/// Retracement read for the most recent swing pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibZones {
    /// True when the active leg is low-to-high.
    pub leg_up: bool,
    pub swing_high: f64,
    pub swing_low: f64,
    pub levels: Vec<FibLevel>,
    /// Golden-zone price band (deeper bound first for an up leg).
    pub golden_zone: (f64, f64),
    /// True iff the latest close sits inside the golden zone.
    pub is_active: bool,
}

/// Compute retracement zones from the most recent swing pair.
///
/// Returns `None` when the series has no confirmed swing high + low pair or
/// the pair is degenerate (zero leg height).
pub fn fibonacci_zones(candles: &[Candle]) -> Option<FibZones> {
    let swings = find_swings(candles);

    let last_high = swings.iter().rev().find(|s| s.is_high)?;
    let last_low = swings.iter().rev().find(|s| !s.is_high)?;

    let swing_high = last_high.price;
    let swing_low = last_low.price;
    let height = swing_high - swing_low;
    if height <= 0.0 {
        return None;
    }

    // The later swing decides the leg direction.
    let leg_up = last_high.index > last_low.index;
    let last_close = candles.last()?.close;

    // Retracement prices: for an up leg the level is measured down from the
    // high; for a down leg up from the low.
    let levels: Vec<FibLevel> = FIB_RATIOS
        .iter()
        .map(|&ratio| {
            let price = if leg_up {
                swing_high - height * ratio
            } else {
                swing_low + height * ratio
            };
            FibLevel { ratio, price }
        })
        .collect();

    let z618 = levels[3].price;
    let z786 = levels[4].price;
    let (zone_lo, zone_hi) = if z618 <= z786 { (z618, z786) } else { (z786, z618) };
    let is_active = (zone_lo..=zone_hi).contains(&last_close);

    Some(FibZones {
        leg_up,
        swing_high,
        swing_low,
        levels,
        golden_zone: (z618, z786),
        is_active,
    })
}
