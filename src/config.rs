// =============================================================================
// Screener Configuration — environment-driven settings
// =============================================================================
//
// Central configuration hub for the screening service. Everything tunable is
// read from the environment once at startup (after dotenv), with defaults
// that make the service runnable out of the box against the public upstream.
//
// Every field has an explicit default helper so the full default
// configuration is visible in one place.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

// =============================================================================
// Default-value helpers
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_upstream_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_derivatives_url() -> Option<String> {
    Some("https://fapi.binance.com".to_string())
}

fn default_symbols() -> Vec<String> {
    vec![
        "BTC-USDT-SWAP".to_string(),
        "ETH-USDT-SWAP".to_string(),
        "SOL-USDT-SWAP".to_string(),
        "XRP-USDT-SWAP".to_string(),
        "BNB-USDT-SWAP".to_string(),
    ]
}

fn default_cache_ttl_secs() -> u64 {
    20
}

fn default_run_cache_ttl_secs() -> u64 {
    300
}

fn default_buy_threshold() -> u8 {
    65
}

fn default_sell_threshold() -> u8 {
    35
}

fn default_max_cache_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_max_cache_items() -> usize {
    5_000
}

/// Deployment environment. Controls IP masking in metrics output and the
/// private-network admission exemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Self::Development
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Layer weights
// =============================================================================

/// Per-layer aggregation weights. SMC carries full weight; indicator-family
/// layers (trend, momentum, price action, fibonacci) and flow-family layers
/// (cvd, funding, open interest) share family weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerWeights {
    pub smc: f64,
    pub price_action: f64,
    pub ema_trend: f64,
    pub momentum: f64,
    pub cvd: f64,
    pub funding: f64,
    pub open_interest: f64,
    pub fibonacci: f64,
}

impl Default for LayerWeights {
    fn default() -> Self {
        Self {
            smc: 1.0,
            price_action: 0.6,
            ema_trend: 0.6,
            momentum: 0.6,
            cvd: 0.5,
            funding: 0.5,
            open_interest: 0.5,
            fibonacci: 0.6,
        }
    }
}

// =============================================================================
// ScreenerConfig
// =============================================================================

/// Top-level configuration for the screening service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    // --- HTTP surface --------------------------------------------------------
    pub bind_addr: String,

    /// Accepted API keys for authenticated endpoints. Empty means every
    /// authenticated request is rejected.
    pub api_keys: Vec<String>,

    // --- Upstream ------------------------------------------------------------
    pub upstream_url: String,
    pub derivatives_url: Option<String>,

    /// Symbols advertised by `/supported-symbols` and accepted without a
    /// warning log.
    pub symbols: Vec<String>,

    // --- Screening -----------------------------------------------------------
    pub cache_ttl_secs: u64,
    pub run_cache_ttl_secs: u64,
    pub buy_threshold: u8,
    pub sell_threshold: u8,
    pub weights: LayerWeights,

    /// Multi-timeframe bias tilt. Off by default; enabling adds one
    /// higher-timeframe fetch per cold symbol.
    pub enable_mtf: bool,

    // --- Caches --------------------------------------------------------------
    pub max_cache_bytes: usize,
    pub max_cache_items: usize,

    // --- Lifecycle & observability -------------------------------------------
    /// SQLite path for the signal event log. Absent means emissions no-op.
    pub database_path: Option<String>,
    pub event_log_enabled: bool,

    /// Best-effort alert webhook. Absent means alerts only hit the log.
    pub webhook_url: Option<String>,

    // --- Admission -----------------------------------------------------------
    pub environment: Environment,
    /// Proxies whose X-Forwarded-For headers are trusted.
    pub trusted_proxies: Vec<String>,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api_keys: Vec::new(),
            upstream_url: default_upstream_url(),
            derivatives_url: default_derivatives_url(),
            symbols: default_symbols(),
            cache_ttl_secs: default_cache_ttl_secs(),
            run_cache_ttl_secs: default_run_cache_ttl_secs(),
            buy_threshold: default_buy_threshold(),
            sell_threshold: default_sell_threshold(),
            weights: LayerWeights::default(),
            enable_mtf: false,
            max_cache_bytes: default_max_cache_bytes(),
            max_cache_items: default_max_cache_items(),
            database_path: None,
            event_log_enabled: false,
            webhook_url: None,
            environment: Environment::Development,
            trusted_proxies: Vec::new(),
        }
    }
}

impl ScreenerConfig {
    /// Build the configuration from the process environment.
    ///
    /// Unparseable values fall back to the default with a warning rather than
    /// aborting startup.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SCREENER_BIND_ADDR") {
            cfg.bind_addr = v;
        }
        cfg.api_keys = csv_env("SCREENER_API_KEYS");
        if let Ok(v) = std::env::var("SCREENER_UPSTREAM_URL") {
            cfg.upstream_url = v;
        }
        if let Ok(v) = std::env::var("SCREENER_DERIVATIVES_URL") {
            cfg.derivatives_url = if v.is_empty() { None } else { Some(v) };
        }
        let symbols = csv_env("SCREENER_SYMBOLS");
        if !symbols.is_empty() {
            cfg.symbols = symbols.iter().map(|s| s.to_uppercase()).collect();
        }

        cfg.cache_ttl_secs = parse_env("SCREENER_CACHE_TTL_SECS", cfg.cache_ttl_secs);
        cfg.run_cache_ttl_secs = parse_env("SCREENER_RUN_CACHE_TTL_SECS", cfg.run_cache_ttl_secs);
        cfg.buy_threshold = parse_env("SCREENER_BUY_THRESHOLD", cfg.buy_threshold);
        cfg.sell_threshold = parse_env("SCREENER_SELL_THRESHOLD", cfg.sell_threshold);
        cfg.enable_mtf = parse_env("SCREENER_ENABLE_MTF", cfg.enable_mtf);
        cfg.max_cache_bytes = parse_env("SCREENER_MAX_CACHE_BYTES", cfg.max_cache_bytes);
        cfg.max_cache_items = parse_env("SCREENER_MAX_CACHE_ITEMS", cfg.max_cache_items);

        cfg.weights.smc = parse_env("SCREENER_WEIGHT_SMC", cfg.weights.smc);
        for (key, slot) in [
            ("SCREENER_WEIGHT_INDICATORS", 0usize),
            ("SCREENER_WEIGHT_FLOW", 1usize),
        ] {
            if let Ok(raw) = std::env::var(key) {
                match raw.parse::<f64>() {
                    Ok(w) if slot == 0 => {
                        cfg.weights.price_action = w;
                        cfg.weights.ema_trend = w;
                        cfg.weights.momentum = w;
                        cfg.weights.fibonacci = w;
                    }
                    Ok(w) => {
                        cfg.weights.cvd = w;
                        cfg.weights.funding = w;
                        cfg.weights.open_interest = w;
                    }
                    Err(_) => warn!(key, raw, "unparseable weight, keeping default"),
                }
            }
        }

        cfg.database_path = std::env::var("SCREENER_DATABASE_PATH").ok().filter(|s| !s.is_empty());
        cfg.event_log_enabled = parse_env("SCREENER_EVENT_LOG_ENABLED", cfg.database_path.is_some());
        cfg.webhook_url = std::env::var("SCREENER_WEBHOOK_URL").ok().filter(|s| !s.is_empty());

        if let Ok(v) = std::env::var("SCREENER_ENV") {
            cfg.environment = match v.to_lowercase().as_str() {
                "production" | "prod" => Environment::Production,
                _ => Environment::Development,
            };
        }
        cfg.trusted_proxies = csv_env("SCREENER_TRUSTED_PROXIES");

        cfg
    }

    /// Sanity-check threshold ordering. A crossed pair would make every
    /// result both BUY and SELL eligible.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sell_threshold >= self.buy_threshold {
            anyhow::bail!(
                "sell_threshold ({}) must be below buy_threshold ({})",
                self.sell_threshold,
                self.buy_threshold
            );
        }
        if self.buy_threshold > 100 {
            anyhow::bail!("buy_threshold must be <= 100");
        }
        Ok(())
    }
}

/// Parse an env var, falling back to `default` (with a warning) when the
/// value is present but unparseable.
fn parse_env<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, raw, "unparseable value, keeping default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Split a comma-separated env var into trimmed, non-empty entries.
fn csv_env(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = ScreenerConfig::default();
        assert_eq!(cfg.buy_threshold, 65);
        assert_eq!(cfg.sell_threshold, 35);
        assert_eq!(cfg.cache_ttl_secs, 20);
        assert_eq!(cfg.symbols.len(), 5);
        assert_eq!(cfg.environment, Environment::Development);
        assert!(!cfg.event_log_enabled);
        assert!(cfg.api_keys.is_empty());
        assert!((cfg.weights.smc - 1.0).abs() < f64::EPSILON);
        assert!((cfg.weights.ema_trend - 0.6).abs() < f64::EPSILON);
        assert!((cfg.weights.cvd - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn validate_rejects_crossed_thresholds() {
        let mut cfg = ScreenerConfig::default();
        cfg.buy_threshold = 30;
        cfg.sell_threshold = 40;
        assert!(cfg.validate().is_err());

        cfg.buy_threshold = 65;
        cfg.sell_threshold = 35;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_weights_keep_total_in_normalization_range() {
        // With every layer pinned to its band edge, the weighted total must
        // stay inside the clamp handled by normalization.
        let w = LayerWeights::default();
        let max_total = 30.0 * w.smc
            + 12.0 * (w.price_action + w.ema_trend + w.momentum + w.fibonacci)
            + 12.0 * (w.cvd + w.funding + w.open_interest);
        assert!(max_total > 30.0);
        assert!(max_total < 100.0);
    }
}
