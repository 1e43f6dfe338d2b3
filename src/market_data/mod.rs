// =============================================================================
// Market Data Types — candles, timeframes, derivatives snapshots
// =============================================================================

pub mod client;

pub use client::{HttpMarketDataClient, MarketDataClient, RetryPolicy};

use serde::{Deserialize, Serialize};

/// A single closed OHLCV candle from the upstream feed.
///
/// Series are always oldest-first and strictly ascending in `open_time`.
/// Upstream guarantees `low <= min(open, close) <= max(open, close) <= high`
/// and `volume >= 0`; [`Candle::is_well_formed`] re-checks both when parsing
/// untrusted payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Check the OHLCV shape invariant.
    pub fn is_well_formed(&self) -> bool {
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        self.low <= body_low && body_high <= self.high && self.volume >= 0.0
    }

    /// Signed body: positive for an up candle, negative for a down candle.
    pub fn body(&self) -> f64 {
        self.close - self.open
    }
}

/// Optional derivatives context attached to a market snapshot.
///
/// Both fields are best-effort: upstream endpoints for open interest and
/// funding may be unavailable for spot-only symbols, and their absence is
/// not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivativesSnapshot {
    /// Open-interest change over the recent window, in percent.
    pub oi_change_pct: Option<f64>,
    /// Latest funding rate as a decimal (0.0001 = 0.01%).
    pub funding_rate: Option<f64>,
}

/// Everything the per-symbol pipeline needs from one upstream fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
    pub derivatives: DerivativesSnapshot,
}

/// The timeframes the screener accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// The wire representation used in upstream queries and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    /// The higher timeframe used for the MTF bias, when one exists.
    ///
    /// `1d` has no higher timeframe in the supported set; MTF analysis is
    /// skipped there.
    pub fn higher(&self) -> Option<Timeframe> {
        match self {
            Self::M1 => Some(Self::M15),
            Self::M3 => Some(Self::M30),
            Self::M5 | Self::M15 => Some(Self::H1),
            Self::M30 | Self::H1 => Some(Self::H4),
            Self::H4 => Some(Self::D1),
            Self::D1 => None,
        }
    }

    pub fn parse(s: &str) -> Option<Timeframe> {
        match s {
            "1m" => Some(Self::M1),
            "3m" => Some(Self::M3),
            "5m" => Some(Self::M5),
            "15m" => Some(Self::M15),
            "30m" => Some(Self::M30),
            "1h" => Some(Self::H1),
            "4h" => Some(Self::H4),
            "1d" => Some(Self::D1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_shape_invariant() {
        let good = Candle::new(0, 10.0, 12.0, 9.0, 11.0, 100.0);
        assert!(good.is_well_formed());

        let bad_high = Candle::new(0, 10.0, 10.5, 9.0, 11.0, 100.0);
        assert!(!bad_high.is_well_formed());

        let bad_volume = Candle::new(0, 10.0, 12.0, 9.0, 11.0, -1.0);
        assert!(!bad_volume.is_well_formed());
    }

    #[test]
    fn timeframe_roundtrip() {
        for s in ["1m", "3m", "5m", "15m", "30m", "1h", "4h", "1d"] {
            let tf = Timeframe::parse(s).unwrap();
            assert_eq!(tf.as_str(), s);
        }
        assert!(Timeframe::parse("2h").is_none());
    }

    #[test]
    fn timeframe_serde_uses_wire_names() {
        let tf: Timeframe = serde_json::from_str("\"15m\"").unwrap();
        assert_eq!(tf, Timeframe::M15);
        assert_eq!(serde_json::to_string(&Timeframe::H4).unwrap(), "\"4h\"");
    }

    #[test]
    fn higher_timeframe_mapping() {
        assert_eq!(Timeframe::M15.higher(), Some(Timeframe::H1));
        assert_eq!(Timeframe::H4.higher(), Some(Timeframe::D1));
        assert_eq!(Timeframe::D1.higher(), None);
    }
}
