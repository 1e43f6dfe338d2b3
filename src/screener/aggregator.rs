// =============================================================================
// Confluence Aggregator — weighted sum, normalization, verdict
// =============================================================================
//
// Pure function of its inputs: the same breakdown and tilt always produce a
// byte-identical result.
//
//   total      = sum(weight_i * score_i) + mtf_tilt
//   normalized = clamp(round((total + 30) / 60 * 100), 0, 100)
//   label      = BUY  iff normalized >= buy_threshold
//                SELL iff normalized <= sell_threshold
//                HOLD otherwise
//   confidence = min(100, |normalized - 50| * 2)
//
// Risk is Medium by default, High when normalized <= 30, and Low only when
// an agreeing higher-timeframe bias confirms the verdict at normalized >= 80.
//
// The 3-group projection (SMC / IND / DER) shown in the summary is derived
// from the canonical 8-layer breakdown, clamped to the coarse bands
// [-30,30] / [-20,20] / [-15,15].
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::config::LayerWeights;
use crate::screener::layers::LayerBreakdown;

/// Screening verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "HOLD")]
    Hold,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Higher-timeframe bias input, produced by the engine when MTF is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtfBias {
    pub timeframe: String,
    /// EMA(20)/EMA(50) separation on the higher timeframe, in percent.
    pub separation_pct: f64,
}

/// MTF diagnostics attached to the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtfInfo {
    pub timeframe: String,
    pub bias: String,
    /// Additive tilt applied to the total score, in [-10, +10].
    pub applied_tilt: i32,
    /// True when the higher-timeframe bias points the same way as the base
    /// confluence total. Reported only; never flips the label by itself.
    pub agreement: bool,
    pub reason: String,
}

/// Final confluence verdict for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceResult {
    pub total_score: f64,
    pub normalized_score: u8,
    pub label: Label,
    pub confidence: u8,
    pub risk_level: RiskLevel,
    pub layers: LayerBreakdown,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mtf: Option<MtfInfo>,
}

/// Weighted aggregation of the 8-layer breakdown.
#[derive(Debug, Clone)]
pub struct ConfluenceAggregator {
    weights: LayerWeights,
    buy_threshold: u8,
    sell_threshold: u8,
}

impl ConfluenceAggregator {
    pub fn new(weights: LayerWeights, buy_threshold: u8, sell_threshold: u8) -> Self {
        Self {
            weights,
            buy_threshold,
            sell_threshold,
        }
    }

    /// Aggregate a layer breakdown into the final verdict.
    pub fn aggregate(&self, layers: LayerBreakdown, htf: Option<HtfBias>) -> ConfluenceResult {
        let w = &self.weights;
        let base_total = w.smc * layers.smc.score as f64
            + w.price_action * layers.price_action.score as f64
            + w.ema_trend * layers.ema_trend.score as f64
            + w.momentum * layers.momentum.score as f64
            + w.cvd * layers.cvd.score as f64
            + w.funding * layers.funding.score as f64
            + w.open_interest * layers.open_interest.score as f64
            + w.fibonacci * layers.fibonacci.score as f64;

        // --- MTF tilt ---------------------------------------------------------
        let mtf = htf.map(|bias| {
            let tilt = (bias.separation_pct * 2.0).round().clamp(-10.0, 10.0) as i32;
            let direction = if bias.separation_pct > 0.0 {
                "bullish"
            } else if bias.separation_pct < 0.0 {
                "bearish"
            } else {
                "flat"
            };
            let agreement = (tilt as f64) * base_total > 0.0;
            MtfInfo {
                timeframe: bias.timeframe.clone(),
                bias: direction.to_string(),
                applied_tilt: tilt,
                agreement,
                reason: format!(
                    "{} EMA stack {direction} ({:+.2}%), tilt {tilt:+}",
                    bias.timeframe, bias.separation_pct
                ),
            }
        });

        let total = base_total + mtf.as_ref().map_or(0.0, |m| m.applied_tilt as f64);

        // --- Normalization & verdict ------------------------------------------
        let normalized = (((total + 30.0) / 60.0) * 100.0).round().clamp(0.0, 100.0) as u8;

        let label = if normalized >= self.buy_threshold {
            Label::Buy
        } else if normalized <= self.sell_threshold {
            Label::Sell
        } else {
            Label::Hold
        };

        let confidence = ((normalized as i32 - 50).unsigned_abs() * 2).min(100) as u8;

        let htf_confirms = mtf.as_ref().is_some_and(|m| m.agreement);
        let risk_level = if normalized <= 30 {
            RiskLevel::High
        } else if htf_confirms && normalized >= 80 {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        };

        // --- 3-group projection for presentation ------------------------------
        let ind_group = (layers.ema_trend.score
            + layers.momentum.score
            + layers.price_action.score
            + layers.fibonacci.score)
            .clamp(-20, 20);
        let der_group =
            (layers.funding.score + layers.open_interest.score + layers.cvd.score).clamp(-15, 15);
        let smc_group = layers.smc.score.clamp(-30, 30);

        let summary = format!("SMC:{smc_group} IND:{ind_group} DER:{der_group} → {normalized}");

        ConfluenceResult {
            total_score: total,
            normalized_score: normalized,
            label,
            confidence,
            risk_level,
            layers,
            summary,
            mtf,
        }
    }
}
