// =============================================================================
// Layer Scorers — eight clamped sub-scores with rationale
// =============================================================================
//
// Each scorer maps indicator output to an integer contribution plus a reason
// list. Bands are part of the contract: SMC clamps to [-30, +30], every
// other layer to [-12, +12]. A scorer that lacks input contributes 0 with a
// reason rather than failing.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::indicators::{
    adx_proxy, calculate_ema, calculate_rsi, dominant_side, ema_separation_pct, fibonacci_zones,
    smc_bias, SmcBias,
};
use crate::market_data::{Candle, DerivativesSnapshot};
use crate::screener::Layer;

/// Band for the SMC layer.
pub const SMC_BAND: i32 = 30;
/// Band for every non-SMC layer.
pub const LAYER_BAND: i32 = 12;

/// One layer's contribution to the confluence score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerScore {
    pub score: i32,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub confidence: Option<f64>,
}

impl LayerScore {
    fn new(score: i32, band: i32, reasons: Vec<String>, confidence: Option<f64>) -> Self {
        Self {
            score: score.clamp(-band, band),
            reasons,
            confidence,
        }
    }

    fn flat(reason: &str) -> Self {
        Self {
            score: 0,
            reasons: vec![reason.to_string()],
            confidence: None,
        }
    }
}

/// All eight layer scores for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerBreakdown {
    pub smc: LayerScore,
    pub price_action: LayerScore,
    pub ema_trend: LayerScore,
    pub momentum: LayerScore,
    pub cvd: LayerScore,
    pub funding: LayerScore,
    pub open_interest: LayerScore,
    pub fibonacci: LayerScore,
}

impl LayerBreakdown {
    pub fn get(&self, layer: Layer) -> &LayerScore {
        match layer {
            Layer::Smc => &self.smc,
            Layer::PriceAction => &self.price_action,
            Layer::EmaTrend => &self.ema_trend,
            Layer::Momentum => &self.momentum,
            Layer::Cvd => &self.cvd,
            Layer::Funding => &self.funding,
            Layer::OpenInterest => &self.open_interest,
            Layer::Fibonacci => &self.fibonacci,
        }
    }

    fn get_mut(&mut self, layer: Layer) -> &mut LayerScore {
        match layer {
            Layer::Smc => &mut self.smc,
            Layer::PriceAction => &mut self.price_action,
            Layer::EmaTrend => &mut self.ema_trend,
            Layer::Momentum => &mut self.momentum,
            Layer::Cvd => &mut self.cvd,
            Layer::Funding => &mut self.funding,
            Layer::OpenInterest => &mut self.open_interest,
            Layer::Fibonacci => &mut self.fibonacci,
        }
    }
}

/// Run every scorer over one snapshot. Layers switched off in `disabled`
/// contribute 0 but stay visible in the breakdown.
pub fn score_all_layers(
    candles: &[Candle],
    derivatives: &DerivativesSnapshot,
    disabled: &[Layer],
) -> LayerBreakdown {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let trend_sign = ema_separation_pct(&closes, 20, 50)
        .map(f64::signum)
        .unwrap_or(0.0);

    let mut breakdown = LayerBreakdown {
        smc: score_smc(candles),
        price_action: score_price_action(candles),
        ema_trend: score_ema_trend(&closes),
        momentum: score_momentum(candles, &closes),
        cvd: score_cvd(candles),
        funding: score_funding(derivatives.funding_rate),
        open_interest: score_open_interest(derivatives.oi_change_pct, trend_sign),
        fibonacci: score_fibonacci(candles),
    };

    for &layer in disabled {
        *breakdown.get_mut(layer) = LayerScore::flat("layer disabled by request");
    }

    breakdown
}

// =============================================================================
// Individual scorers
// =============================================================================

/// Swing-structure bias. Strength 0..10 scales to the +/-30 band.
pub fn score_smc(candles: &[Candle]) -> LayerScore {
    match smc_bias(candles) {
        Some(snapshot) => {
            let sign = match snapshot.bias {
                SmcBias::Bullish => 1,
                SmcBias::Bearish => -1,
                SmcBias::Neutral => 0,
            };
            let score = sign * snapshot.strength as i32 * 3;
            let mut reasons = vec![format!(
                "{} structure, strength {}/10",
                snapshot.bias, snapshot.strength
            )];
            reasons.extend(snapshot.cues);
            LayerScore::new(score, SMC_BAND, reasons, Some(snapshot.strength as f64 / 10.0))
        }
        None => LayerScore::flat("no confirmed swing structure"),
    }
}

/// Raw price trajectory: recent slope plus candle-body dominance.
pub fn score_price_action(candles: &[Candle]) -> LayerScore {
    const WINDOW: usize = 20;
    if candles.len() < WINDOW + 1 {
        return LayerScore::flat("insufficient data for price action");
    }

    let last = candles[candles.len() - 1].close;
    let base = candles[candles.len() - 1 - WINDOW].close;
    if base.abs() < f64::EPSILON {
        return LayerScore::flat("degenerate price base");
    }
    let change_pct = (last - base) / base * 100.0;

    let tail = &candles[candles.len() - 10..];
    let up_bodies = tail.iter().filter(|c| c.body() > 0.0).count() as i32;
    let down_bodies = tail.iter().filter(|c| c.body() < 0.0).count() as i32;
    // Up to +/-3 from body dominance over the last 10 bars.
    let body_tilt = ((up_bodies - down_bodies) * 3 / 10).clamp(-3, 3);

    let score = (change_pct * 4.0).round() as i32 + body_tilt;
    let direction = if change_pct >= 0.0 { "up" } else { "down" };
    LayerScore::new(
        score,
        LAYER_BAND,
        vec![format!(
            "{direction} {change_pct:.2}% over {WINDOW} bars, {up_bodies}/10 up candles"
        )],
        None,
    )
}

/// EMA(20) vs EMA(50) trend alignment.
pub fn score_ema_trend(closes: &[f64]) -> LayerScore {
    match ema_separation_pct(closes, 20, 50) {
        Some(sep) => {
            let score = (sep * 8.0).round() as i32;
            let side = if sep >= 0.0 { "above" } else { "below" };
            LayerScore::new(
                score,
                LAYER_BAND,
                vec![format!("EMA20 {side} EMA50 by {:.2}%", sep.abs())],
                None,
            )
        }
        None => LayerScore::flat("insufficient data for EMA trend"),
    }
}

/// RSI(14) distance from neutral plus MACD histogram direction, with the
/// ADX proxy gating how much trend-follow weight the combo gets.
pub fn score_momentum(candles: &[Candle], closes: &[f64]) -> LayerScore {
    let Some(&rsi) = calculate_rsi(closes, 14).last() else {
        return LayerScore::flat("insufficient data for RSI");
    };

    // RSI contributes up to +/-8.
    let rsi_part = ((rsi - 50.0) / 50.0 * 8.0).round() as i32;

    // MACD(12, 26, 9) histogram sign contributes +/-4.
    let macd_part = macd_histogram(closes)
        .map(|h| if h > 0.0 { 4 } else if h < 0.0 { -4 } else { 0 })
        .unwrap_or(0);

    let mut reasons = vec![format!("RSI {rsi:.1}")];
    if macd_part != 0 {
        reasons.push(format!(
            "MACD histogram {}",
            if macd_part > 0 { "positive" } else { "negative" }
        ));
    }

    // A dead tape (volatility proxy near zero) halves the momentum read.
    let score = match adx_proxy(candles, 14) {
        Some(adx) if adx < 0.5 => {
            reasons.push(format!("low volatility (adx proxy {adx:.2}), damped"));
            (rsi_part + macd_part) / 2
        }
        _ => rsi_part + macd_part,
    };

    LayerScore::new(score, LAYER_BAND, reasons, Some((rsi - 50.0).abs() / 50.0))
}

/// MACD(12, 26) histogram against its 9-period signal line.
fn macd_histogram(closes: &[f64]) -> Option<f64> {
    if closes.len() < 26 {
        return None;
    }
    let ema12 = calculate_ema(closes, 12);
    let ema26 = calculate_ema(closes, 26);
    let macd_line: Vec<f64> = ema12
        .iter()
        .zip(ema26.iter())
        .map(|(a, b)| a - b)
        .collect();
    let signal = calculate_ema(&macd_line, 9);
    Some(macd_line.last()? - signal.last()?)
}

/// Cumulative volume delta slope.
pub fn score_cvd(candles: &[Candle]) -> LayerScore {
    match dominant_side(candles, 10) {
        Some((side, slope)) => {
            let score = (slope * 12.0).round() as i32;
            LayerScore::new(
                score,
                LAYER_BAND,
                vec![format!("{side} in control, normalized slope {slope:.2}")],
                None,
            )
        }
        None => LayerScore::flat("insufficient data for CVD"),
    }
}

/// Contrarian funding read: crowded longs cap upside, crowded shorts floor
/// downside. Thresholds are funding-rate percentages per interval.
pub fn score_funding(funding_rate: Option<f64>) -> LayerScore {
    let Some(rate) = funding_rate else {
        return LayerScore::flat("funding unavailable");
    };
    let rate_pct = rate * 100.0;

    let (score, interpretation) = if rate_pct > 0.05 {
        (-10, "extreme positive funding, overleveraged longs")
    } else if rate_pct > 0.03 {
        (-6, "elevated positive funding, long crowding")
    } else if rate_pct < -0.05 {
        (10, "extreme negative funding, short squeeze setup")
    } else if rate_pct < -0.03 {
        (6, "elevated negative funding, shorts paying")
    } else if rate_pct > 0.01 {
        (-2, "slightly positive funding")
    } else if rate_pct < -0.01 {
        (2, "slightly negative funding")
    } else {
        (0, "neutral funding")
    };

    LayerScore::new(
        score,
        LAYER_BAND,
        vec![format!("{interpretation} ({rate_pct:.4}%)")],
        None,
    )
}

/// Open-interest change read against the prevailing trend: rising OI feeds
/// the trend (buildup), falling OI fades it (unwind).
pub fn score_open_interest(oi_change_pct: Option<f64>, trend_sign: f64) -> LayerScore {
    let Some(change) = oi_change_pct else {
        return LayerScore::flat("open interest unavailable");
    };
    if trend_sign == 0.0 {
        return LayerScore::flat("no trend context for open interest");
    }

    let magnitude = (change.abs() * 3.0).round() as i32;
    let (score, label) = if change > 0.0 {
        // New positioning in the trend direction.
        ((trend_sign as i32) * magnitude, "buildup")
    } else {
        // Positions closing against the trend.
        (-(trend_sign as i32) * magnitude, "unwind")
    };

    LayerScore::new(
        score,
        LAYER_BAND,
        vec![format!("OI {label} {change:+.2}%/h")],
        None,
    )
}

/// Golden-zone retracement entry: price inside [0.618, 0.786] of an up leg
/// is a discounted long, inside a down leg a premium short.
pub fn score_fibonacci(candles: &[Candle]) -> LayerScore {
    match fibonacci_zones(candles) {
        Some(zones) if zones.is_active => {
            let score = if zones.leg_up { 8 } else { -8 };
            let direction = if zones.leg_up { "up" } else { "down" };
            LayerScore::new(
                score,
                LAYER_BAND,
                vec![format!(
                    "price in golden zone of {direction} leg ({:.4}..{:.4})",
                    zones.golden_zone.0, zones.golden_zone.1
                )],
                Some(0.8),
            )
        }
        Some(_) => LayerScore::flat("no active fibonacci zone"),
        None => LayerScore::flat("no swing pair for fibonacci"),
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Candle;

    /// Trending fixture: rallies of four with two-bar pullbacks (one-bar
    /// pullbacks get overrun before the fractal 2-neighbor check passes, so
    /// no swing would ever confirm). Wick margins are asymmetric between up
    /// and down candles so neighboring bars never tie at an extreme.
    pub fn trending_candles(len: usize, direction: f64) -> Vec<Candle> {
        let mut price = 100.0;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            let step = if i % 6 >= 4 { -0.75 } else { 1.0 };
            let next = price + step * direction;
            let candle = if next >= price {
                Candle::new(i as i64, price, next + 0.10, price - 0.10, next, 100.0)
            } else {
                Candle::new(i as i64, price, price + 0.05, next - 0.05, next, 100.0)
            };
            out.push(candle);
            price = next;
        }
        out
    }

    #[test]
    fn all_layers_respect_their_bands() {
        let candles = trending_candles(200, 1.0);
        let derivatives = DerivativesSnapshot {
            oi_change_pct: Some(50.0),  // absurd, must clamp
            funding_rate: Some(-0.01),  // -1%: extreme
        };
        let breakdown = score_all_layers(&candles, &derivatives, &[]);

        assert!(breakdown.smc.score.abs() <= SMC_BAND);
        for layer in [
            &breakdown.price_action,
            &breakdown.ema_trend,
            &breakdown.momentum,
            &breakdown.cvd,
            &breakdown.funding,
            &breakdown.open_interest,
            &breakdown.fibonacci,
        ] {
            assert!(layer.score.abs() <= LAYER_BAND, "score {}", layer.score);
        }
    }

    #[test]
    fn uptrend_scores_positive_across_trend_layers() {
        let candles = trending_candles(120, 1.0);
        let breakdown = score_all_layers(&candles, &DerivativesSnapshot::default(), &[]);

        assert!(breakdown.smc.score > 0, "smc = {}", breakdown.smc.score);
        assert!(breakdown.price_action.score > 0);
        assert!(breakdown.ema_trend.score > 0);
        assert!(breakdown.momentum.score > 0);
        assert!(breakdown.cvd.score > 0);
    }

    #[test]
    fn downtrend_scores_negative_across_trend_layers() {
        let candles = trending_candles(120, -1.0);
        let breakdown = score_all_layers(&candles, &DerivativesSnapshot::default(), &[]);

        assert!(breakdown.smc.score < 0);
        assert!(breakdown.price_action.score < 0);
        assert!(breakdown.ema_trend.score < 0);
        assert!(breakdown.momentum.score < 0);
    }

    #[test]
    fn missing_derivatives_contribute_zero() {
        let candles = trending_candles(120, 1.0);
        let breakdown = score_all_layers(&candles, &DerivativesSnapshot::default(), &[]);
        assert_eq!(breakdown.funding.score, 0);
        assert_eq!(breakdown.open_interest.score, 0);
        assert!(breakdown.funding.reasons[0].contains("unavailable"));
    }

    #[test]
    fn disabled_layer_is_zeroed_with_reason() {
        let candles = trending_candles(120, 1.0);
        let breakdown =
            score_all_layers(&candles, &DerivativesSnapshot::default(), &[Layer::Smc]);
        assert_eq!(breakdown.smc.score, 0);
        assert!(breakdown.smc.reasons[0].contains("disabled"));
        assert!(breakdown.ema_trend.score > 0);
    }

    #[test]
    fn funding_is_contrarian() {
        // Heavily positive funding caps longs.
        let crowded_longs = score_funding(Some(0.001)); // 0.1%
        assert!(crowded_longs.score < 0);

        // Heavily negative funding floors shorts.
        let crowded_shorts = score_funding(Some(-0.001));
        assert!(crowded_shorts.score > 0);

        assert_eq!(score_funding(Some(0.0)).score, 0);
        assert_eq!(score_funding(None).score, 0);
    }

    #[test]
    fn open_interest_follows_trend_on_buildup_and_fades_on_unwind() {
        let buildup_up = score_open_interest(Some(2.0), 1.0);
        assert!(buildup_up.score > 0);

        let buildup_down = score_open_interest(Some(2.0), -1.0);
        assert!(buildup_down.score < 0);

        let unwind_up = score_open_interest(Some(-2.0), 1.0);
        assert!(unwind_up.score < 0);

        assert_eq!(score_open_interest(None, 1.0).score, 0);
        assert_eq!(score_open_interest(Some(2.0), 0.0).score, 0);
    }

    #[test]
    fn short_series_degrades_to_flat_scores() {
        let candles = trending_candles(10, 1.0);
        let breakdown = score_all_layers(&candles, &DerivativesSnapshot::default(), &[]);
        assert_eq!(breakdown.ema_trend.score, 0);
        assert_eq!(breakdown.momentum.score, 0);
        assert_eq!(breakdown.price_action.score, 0);
    }
}
