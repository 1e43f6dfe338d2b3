// =============================================================================
// Cumulative Volume Delta (CVD) from candles
// =============================================================================
//
// Without trade-level data, candle direction is the aggressor proxy: an up
// candle's volume counts as buying pressure, a down candle's as selling.
//
//   CVD_t = CVD_{t-1} + sign(close_t - open_t) * volume_t
//
// The dominant side is read from the slope of the recent CVD tail, scaled
// against average volume so the verdict is comparable across symbols.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

/// Which side of the tape has been in control recently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CvdSide {
    Buyers,
    Sellers,
    Balanced,
}

impl std::fmt::Display for CvdSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buyers => write!(f, "buyers"),
            Self::Sellers => write!(f, "sellers"),
            Self::Balanced => write!(f, "balanced"),
        }
    }
}

/// Running CVD series, one value per candle.
pub fn cvd_series(candles: &[Candle]) -> Vec<f64> {
    let mut cvd = 0.0;
    candles
        .iter()
        .map(|c| {
            cvd += c.body().signum() * c.volume;
            cvd
        })
        .collect()
}

/// Classify the dominant side from the recent CVD slope.
///
/// Looks at the change across the last `window` values, normalized by the
/// average volume of the same window; a slope smaller than 30% of a typical
/// candle's volume per bar reads as balanced.
///
/// Returns `None` when fewer than `window + 1` candles are available.
pub fn dominant_side(candles: &[Candle], window: usize) -> Option<(CvdSide, f64)> {
    if window == 0 || candles.len() < window + 1 {
        return None;
    }

    let series = cvd_series(candles);
    let tail_start = series.len() - window - 1;
    let delta = series[series.len() - 1] - series[tail_start];

    let avg_volume = candles[tail_start + 1..]
        .iter()
        .map(|c| c.volume)
        .sum::<f64>()
        / window as f64;

    if avg_volume <= 0.0 {
        return Some((CvdSide::Balanced, 0.0));
    }

    // Slope per bar relative to typical bar volume.
    let normalized_slope = delta / window as f64 / avg_volume;

    let side = if normalized_slope > 0.3 {
        CvdSide::Buyers
    } else if normalized_slope < -0.3 {
        CvdSide::Sellers
    } else {
        CvdSide::Balanced
    };

    Some((side, normalized_slope))
}
