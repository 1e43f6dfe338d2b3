// =============================================================================
// Screening pipeline — shared types
// =============================================================================

pub mod aggregator;
pub mod engine;
pub mod layers;

pub use aggregator::{ConfluenceAggregator, ConfluenceResult, Label, MtfInfo, RiskLevel};
pub use engine::{ScreenerRequest, ScreenerResponse, ScreeningEngine, SymbolResult};
pub use layers::{score_all_layers, LayerBreakdown, LayerScore};

use serde::{Deserialize, Serialize};

/// The canonical layer names, used for `enabled_layers` toggles and the
/// per-layer diagnostics map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Smc,
    PriceAction,
    EmaTrend,
    Momentum,
    Cvd,
    Funding,
    OpenInterest,
    Fibonacci,
}

impl Layer {
    pub const ALL: [Layer; 8] = [
        Layer::Smc,
        Layer::PriceAction,
        Layer::EmaTrend,
        Layer::Momentum,
        Layer::Cvd,
        Layer::Funding,
        Layer::OpenInterest,
        Layer::Fibonacci,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Smc => "smc",
            Self::PriceAction => "price_action",
            Self::EmaTrend => "ema_trend",
            Self::Momentum => "momentum",
            Self::Cvd => "cvd",
            Self::Funding => "funding",
            Self::OpenInterest => "open_interest",
            Self::Fibonacci => "fibonacci",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
