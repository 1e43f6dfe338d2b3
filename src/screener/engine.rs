// =============================================================================
// Screening Engine — per-symbol pipeline with cache lookup and fan-out
// =============================================================================
//
// One run:
//   1. Validate the request; nothing downstream is touched on failure.
//   2. Serve symbols with a fresh cache entry immediately.
//   3. Fan out the misses with bounded concurrency; each task fetches
//      through the circuit breaker, scores the eight layers, aggregates,
//      and writes the result back to the cache.
//   4. Failures are absorbed per symbol (HOLD + reason, excluded from
//      aggregate stats); the batch itself only fails on validation.
//
// Completed responses are kept in a run cache so `GET /:run_id` can serve
// them without recomputation.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::admission::validator::is_valid_symbol;
use crate::breaker::{BreakerError, CircuitBreaker};
use crate::cache::SmartCache;
use crate::config::ScreenerConfig;
use crate::errors::ScreenerError;
use crate::indicators::{ema_separation_pct, MIN_CANDLES};
use crate::market_data::{MarketDataClient, Timeframe};
use crate::screener::aggregator::{ConfluenceAggregator, HtfBias};
use crate::screener::layers::score_all_layers;
use crate::screener::{ConfluenceResult, Label, Layer};

/// Hard ceiling on concurrent per-symbol tasks, regardless of batch size.
const MAX_FANOUT: usize = 16;

/// Candle count requested for the higher-timeframe bias fetch.
const HTF_LIMIT: u32 = 120;

// =============================================================================
// Request / response shapes
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerRequest {
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub limit: u32,
    #[serde(default, alias = "enabledLayers")]
    pub enabled_layers: Option<HashMap<String, bool>>,
}

/// Outcome for a single symbol. `is_error` marks symbols whose upstream
/// fetch failed; they surface as HOLD with a reason and are excluded from
/// the aggregate stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolResult {
    pub symbol: String,
    pub label: Label,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub confluence: Option<ConfluenceResult>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub total_symbols: usize,
    pub buy_count: usize,
    pub sell_count: usize,
    pub hold_count: usize,
    pub error_count: usize,
    pub avg_score: f64,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerResponse {
    pub run_id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub results: Vec<SymbolResult>,
    pub stats: RunStats,
}

// =============================================================================
// Engine
// =============================================================================

pub struct ScreeningEngine {
    client: Arc<dyn MarketDataClient>,
    breaker: Arc<CircuitBreaker>,
    result_cache: Arc<SmartCache<SymbolResult>>,
    run_cache: Arc<SmartCache<ScreenerResponse>>,
    aggregator: ConfluenceAggregator,
    cache_ttl: Duration,
    run_cache_ttl: Duration,
    enable_mtf: bool,
    overall_deadline: Duration,
}

impl ScreeningEngine {
    pub fn new(
        config: &ScreenerConfig,
        client: Arc<dyn MarketDataClient>,
        breaker: Arc<CircuitBreaker>,
        result_cache: Arc<SmartCache<SymbolResult>>,
        run_cache: Arc<SmartCache<ScreenerResponse>>,
    ) -> Self {
        Self {
            client,
            breaker,
            result_cache,
            run_cache,
            aggregator: ConfluenceAggregator::new(
                config.weights.clone(),
                config.buy_threshold,
                config.sell_threshold,
            ),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            run_cache_ttl: Duration::from_secs(config.run_cache_ttl_secs),
            enable_mtf: config.enable_mtf,
            overall_deadline: Duration::from_secs(30),
        }
    }

    /// Serve a previously completed run from the run cache.
    pub fn get_run(&self, run_id: &str) -> Option<ScreenerResponse> {
        self.run_cache.get(run_id)
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Check the request against the schema. Duplicate symbols collapse to
    /// their first occurrence (set semantics, deterministic order).
    pub fn validate(request: &ScreenerRequest) -> Result<Vec<String>, ScreenerError> {
        if request.symbols.is_empty() {
            return Err(ScreenerError::Validation {
                details: "symbols must be a non-empty list".to_string(),
            });
        }
        if !(100..=2000).contains(&request.limit) {
            return Err(ScreenerError::Validation {
                details: format!("limit {} outside [100, 2000]", request.limit),
            });
        }

        let mut unique: Vec<String> = Vec::with_capacity(request.symbols.len());
        for raw in &request.symbols {
            if !is_valid_symbol(raw) {
                return Err(ScreenerError::Validation {
                    details: format!("invalid symbol '{raw}'"),
                });
            }
            let canonical = raw.to_uppercase();
            if !unique.contains(&canonical) {
                unique.push(canonical);
            }
        }

        if let Some(toggles) = &request.enabled_layers {
            for name in toggles.keys() {
                if !Layer::ALL.iter().any(|l| l.name() == name) {
                    return Err(ScreenerError::Validation {
                        details: format!("unknown layer '{name}'"),
                    });
                }
            }
        }

        Ok(unique)
    }

    // -------------------------------------------------------------------------
    // Run
    // -------------------------------------------------------------------------

    pub async fn run(&self, request: &ScreenerRequest) -> Result<ScreenerResponse, ScreenerError> {
        let started = Instant::now();
        let symbols = Self::validate(request)?;

        let disabled: Vec<Layer> = request
            .enabled_layers
            .as_ref()
            .map(|toggles| {
                Layer::ALL
                    .iter()
                    .copied()
                    .filter(|l| toggles.get(l.name()) == Some(&false))
                    .collect()
            })
            .unwrap_or_default();

        // --- Cache pass -------------------------------------------------------
        let mut completed: HashMap<String, SymbolResult> = HashMap::new();
        let mut misses: Vec<String> = Vec::new();
        for symbol in &symbols {
            let key = Self::cache_key(symbol, request.timeframe, request.limit);
            match self.result_cache.get(&key) {
                Some(mut hit) => {
                    hit.cached = true;
                    completed.insert(symbol.clone(), hit);
                }
                None => misses.push(symbol.clone()),
            }
        }
        let cache_hits = completed.len();

        // --- Bounded fan-out over the misses ----------------------------------
        let concurrency = ((symbols.len() as f64 * 0.5).ceil() as usize)
            .max(4)
            .min(MAX_FANOUT);
        let deadline = tokio::time::Instant::now() + self.overall_deadline;
        let disabled_ref = &disabled;
        let (timeframe, limit) = (request.timeframe, request.limit);

        let fresh: Vec<SymbolResult> = stream::iter(misses)
            .map(|symbol| async move {
                match tokio::time::timeout_at(
                    deadline,
                    self.screen_symbol(&symbol, timeframe, limit, disabled_ref),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(symbol = %symbol, "symbol task hit the overall run deadline");
                        Self::failed(
                            &symbol,
                            &ScreenerError::Upstream("overall run deadline exceeded".to_string()),
                        )
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for result in fresh {
            completed.insert(result.symbol.clone(), result);
        }

        // --- Assemble in request order ----------------------------------------
        let results: Vec<SymbolResult> = symbols
            .iter()
            .filter_map(|s| completed.remove(s))
            .collect();

        let scored: Vec<&SymbolResult> = results.iter().filter(|r| !r.is_error).collect();
        let buy_count = scored.iter().filter(|r| r.label == Label::Buy).count();
        let sell_count = scored.iter().filter(|r| r.label == Label::Sell).count();
        let hold_count = scored.iter().filter(|r| r.label == Label::Hold).count();
        let avg_score = if scored.is_empty() {
            0.0
        } else {
            scored
                .iter()
                .filter_map(|r| r.confluence.as_ref())
                .map(|c| c.normalized_score as f64)
                .sum::<f64>()
                / scored.iter().filter(|r| r.confluence.is_some()).count().max(1) as f64
        };

        let response = ScreenerResponse {
            run_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            stats: RunStats {
                total_symbols: results.len(),
                buy_count,
                sell_count,
                hold_count,
                error_count: results.iter().filter(|r| r.is_error).count(),
                avg_score,
                processing_time_ms: started.elapsed().as_millis() as u64,
            },
            results,
        };

        self.run_cache
            .set(response.run_id.clone(), response.clone(), Some(self.run_cache_ttl));

        info!(
            run_id = %response.run_id,
            symbols = response.stats.total_symbols,
            cache_hits,
            buy = response.stats.buy_count,
            sell = response.stats.sell_count,
            hold = response.stats.hold_count,
            errors = response.stats.error_count,
            elapsed_ms = response.stats.processing_time_ms,
            "screening run complete"
        );

        Ok(response)
    }

    // -------------------------------------------------------------------------
    // Per-symbol pipeline
    // -------------------------------------------------------------------------

    async fn screen_symbol(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
        disabled: &[Layer],
    ) -> SymbolResult {
        let snapshot = match self
            .breaker
            .execute(|| self.client.fetch(symbol, timeframe, limit))
            .await
        {
            Ok(snapshot) => snapshot,
            Err(BreakerError::Open) => {
                return Self::failed(symbol, &ScreenerError::CircuitOpen);
            }
            Err(BreakerError::Inner(e)) => {
                return Self::failed(symbol, &ScreenerError::Upstream(e.to_string()));
            }
        };

        if snapshot.candles.len() < MIN_CANDLES {
            // Not an error class: the fetch worked, the market is just young.
            let result = SymbolResult {
                symbol: symbol.to_string(),
                label: Label::Hold,
                confluence: None,
                reason: Some(format!(
                    "{}: {} candles, need {MIN_CANDLES}",
                    ScreenerError::DataInsufficient,
                    snapshot.candles.len()
                )),
                is_error: false,
                cached: false,
            };
            let key = Self::cache_key(symbol, timeframe, limit);
            self.result_cache.set(key, result.clone(), Some(self.cache_ttl));
            return result;
        }

        let layers = score_all_layers(&snapshot.candles, &snapshot.derivatives, disabled);
        let htf = if self.enable_mtf {
            self.htf_bias(symbol, timeframe).await
        } else {
            None
        };

        let confluence = self.aggregator.aggregate(layers, htf);
        let result = SymbolResult {
            symbol: symbol.to_string(),
            label: confluence.label,
            confluence: Some(confluence),
            reason: None,
            is_error: false,
            cached: false,
        };

        let key = Self::cache_key(symbol, timeframe, limit);
        self.result_cache.set(key, result.clone(), Some(self.cache_ttl));
        result
    }

    /// Higher-timeframe EMA bias for the MTF tilt. Best-effort: any failure
    /// just drops the tilt.
    async fn htf_bias(&self, symbol: &str, timeframe: Timeframe) -> Option<HtfBias> {
        let higher = timeframe.higher()?;
        let snapshot = match self
            .breaker
            .execute(|| self.client.fetch(symbol, higher, HTF_LIMIT))
            .await
        {
            Ok(s) => s,
            Err(e) => {
                debug!(symbol, higher = %higher, error = %e, "HTF fetch unavailable");
                return None;
            }
        };

        let closes: Vec<f64> = snapshot.candles.iter().map(|c| c.close).collect();
        let separation_pct = ema_separation_pct(&closes, 20, 50)?;
        Some(HtfBias {
            timeframe: higher.as_str().to_string(),
            separation_pct,
        })
    }

    /// Per-symbol failure: HOLD with the error's message, excluded from
    /// aggregate stats, never cached (the next request should retry).
    fn failed(symbol: &str, error: &ScreenerError) -> SymbolResult {
        SymbolResult {
            symbol: symbol.to_string(),
            label: Label::Hold,
            confluence: None,
            reason: Some(error.to_string()),
            is_error: true,
            cached: false,
        }
    }

    fn cache_key(symbol: &str, timeframe: Timeframe, limit: u32) -> String {
        format!("{symbol}|{timeframe}|{limit}")
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerConfig, CircuitState};
    use crate::config::ScreenerConfig;
    use crate::market_data::{Candle, DerivativesSnapshot, MarketSnapshot};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Trending fixture: rallies of four with two-bar pullbacks so fractal
    /// swings confirm, asymmetric wick margins so neighbors never tie.
    fn trending_candles(len: usize, direction: f64) -> Vec<Candle> {
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

    /// Scripted market-data client: per-symbol candle sets, optional failure
    /// injection, and call counting.
    struct MockClient {
        candles: HashMap<String, Vec<Candle>>,
        derivatives: DerivativesSnapshot,
        failing: Mutex<HashMap<String, u32>>,
        calls: Mutex<HashMap<String, u32>>,
        latency: Duration,
    }

    impl MockClient {
        fn new(candles: HashMap<String, Vec<Candle>>) -> Self {
            Self {
                candles,
                derivatives: DerivativesSnapshot::default(),
                failing: Mutex::new(HashMap::new()),
                calls: Mutex::new(HashMap::new()),
                latency: Duration::from_millis(10),
            }
        }

        fn with_derivatives(mut self, derivatives: DerivativesSnapshot) -> Self {
            self.derivatives = derivatives;
            self
        }

        fn fail_next(&self, symbol: &str, times: u32) {
            self.failing.lock().insert(symbol.to_string(), times);
        }

        fn calls_for(&self, symbol: &str) -> u32 {
            self.calls.lock().get(symbol).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl MarketDataClient for MockClient {
        async fn fetch(
            &self,
            symbol: &str,
            timeframe: Timeframe,
            _limit: u32,
        ) -> anyhow::Result<MarketSnapshot> {
            *self.calls.lock().entry(symbol.to_string()).or_insert(0) += 1;
            tokio::time::sleep(self.latency).await;

            {
                let mut failing = self.failing.lock();
                if let Some(remaining) = failing.get_mut(symbol) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        anyhow::bail!("injected upstream failure");
                    }
                }
            }

            let candles = self
                .candles
                .get(symbol)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown symbol {symbol}"))?;

            Ok(MarketSnapshot {
                symbol: symbol.to_string(),
                timeframe,
                candles,
                derivatives: self.derivatives.clone(),
            })
        }
    }

    fn engine_with(client: Arc<MockClient>) -> (ScreeningEngine, Arc<CircuitBreaker>) {
        let config = ScreenerConfig::default();
        let breaker = Arc::new(CircuitBreaker::new(
            "market-data",
            BreakerConfig {
                failure_threshold: 5,
                reset_timeout: Duration::from_millis(100),
                half_open_max_calls: 1,
                half_open_success_threshold: 3,
            },
        ));
        let result_cache = Arc::new(SmartCache::new(
            "results",
            1000,
            1 << 20,
            Duration::from_secs(20),
        ));
        let run_cache = Arc::new(SmartCache::new(
            "runs",
            1000,
            1 << 20,
            Duration::from_secs(300),
        ));
        let engine = ScreeningEngine::new(&config, client, breaker.clone(), result_cache, run_cache);
        (engine, breaker)
    }

    fn request(symbols: &[&str]) -> ScreenerRequest {
        ScreenerRequest {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            timeframe: Timeframe::M15,
            limit: 500,
            enabled_layers: None,
        }
    }

    // ---- validation ------------------------------------------------------

    #[test]
    fn validation_rejects_bad_requests() {
        let empty = request(&[]);
        assert!(matches!(
            ScreeningEngine::validate(&empty),
            Err(ScreenerError::Validation { .. })
        ));

        let mut bad_limit = request(&["BTC-USDT-SWAP"]);
        bad_limit.limit = 50;
        assert!(ScreeningEngine::validate(&bad_limit).is_err());
        bad_limit.limit = 5000;
        assert!(ScreeningEngine::validate(&bad_limit).is_err());

        let injection = request(&["BTC'; DROP TABLE--"]);
        assert!(ScreeningEngine::validate(&injection).is_err());

        let mut unknown_layer = request(&["BTC-USDT-SWAP"]);
        unknown_layer.enabled_layers =
            Some(HashMap::from([("astrology".to_string(), true)]));
        assert!(ScreeningEngine::validate(&unknown_layer).is_err());
    }

    #[test]
    fn validation_dedupes_preserving_order() {
        let req = request(&["sol-usdt-swap", "BTC-USDT-SWAP", "SOL-USDT-SWAP"]);
        let unique = ScreeningEngine::validate(&req).unwrap();
        assert_eq!(unique, vec!["SOL-USDT-SWAP", "BTC-USDT-SWAP"]);
    }

    // ---- end-to-end scenarios --------------------------------------------

    #[tokio::test]
    async fn uptrend_produces_buy_verdict() {
        let client = Arc::new(
            MockClient::new(HashMap::from([(
                "SOL-USDT-SWAP".to_string(),
                trending_candles(500, 1.0),
            )]))
            .with_derivatives(DerivativesSnapshot {
                oi_change_pct: Some(2.0),
                funding_rate: Some(0.0),
            }),
        );
        let (engine, _) = engine_with(client);

        let response = engine.run(&request(&["SOL-USDT-SWAP"])).await.unwrap();
        assert_eq!(response.results.len(), 1);

        let result = &response.results[0];
        assert_eq!(result.label, Label::Buy);
        let confluence = result.confluence.as_ref().unwrap();
        assert!(confluence.normalized_score >= 65);
        assert_eq!(
            confluence.risk_level,
            crate::screener::RiskLevel::Medium,
            "no HTF confirmation means Medium"
        );
        assert!(confluence.summary.starts_with("SMC:"));
        assert_eq!(response.stats.buy_count, 1);
    }

    #[tokio::test]
    async fn downtrend_produces_sell_verdict() {
        let client = Arc::new(
            MockClient::new(HashMap::from([(
                "SOL-USDT-SWAP".to_string(),
                trending_candles(500, -1.0),
            )]))
            .with_derivatives(DerivativesSnapshot {
                oi_change_pct: Some(-2.0),
                funding_rate: Some(0.0),
            }),
        );
        let (engine, _) = engine_with(client);

        let response = engine.run(&request(&["SOL-USDT-SWAP"])).await.unwrap();
        let result = &response.results[0];
        assert_eq!(result.label, Label::Sell);
        assert!(result.confluence.as_ref().unwrap().normalized_score <= 35);
        assert_eq!(response.stats.sell_count, 1);
    }

    #[tokio::test]
    async fn short_candle_series_holds_with_reason() {
        let client = Arc::new(MockClient::new(HashMap::from([(
            "BTC-USDT-SWAP".to_string(),
            trending_candles(20, 1.0),
        )])));
        let (engine, breaker) = engine_with(client);

        let response = engine.run(&request(&["BTC-USDT-SWAP"])).await.unwrap();
        let result = &response.results[0];
        assert_eq!(result.label, Label::Hold);
        assert!(result.reason.as_ref().unwrap().contains("insufficient data"));
        assert!(!result.is_error);
        // The fetch itself succeeded; the breaker must be untouched.
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(response.stats.hold_count, 1);
        assert_eq!(response.stats.error_count, 0);
    }

    #[tokio::test]
    async fn second_run_within_ttl_is_served_from_cache() {
        let client = Arc::new(MockClient::new(HashMap::from([
            ("BTC-USDT-SWAP".to_string(), trending_candles(500, 1.0)),
            ("ETH-USDT-SWAP".to_string(), trending_candles(500, 1.0)),
        ])));
        let (engine, _) = engine_with(client.clone());
        let req = request(&["BTC-USDT-SWAP", "ETH-USDT-SWAP"]);

        let first = engine.run(&req).await.unwrap();
        let second = engine.run(&req).await.unwrap();

        // Upstream touched exactly once per symbol across both runs.
        assert_eq!(client.calls_for("BTC-USDT-SWAP"), 1);
        assert_eq!(client.calls_for("ETH-USDT-SWAP"), 1);

        assert!(first.results.iter().all(|r| !r.cached));
        assert!(second.results.iter().all(|r| r.cached));
        assert!(
            second.stats.processing_time_ms < first.stats.processing_time_ms.max(1),
            "cached run must be faster: {} vs {}",
            second.stats.processing_time_ms,
            first.stats.processing_time_ms
        );
        // Verdicts are identical either way.
        assert_eq!(first.results[0].label, second.results[0].label);
    }

    #[tokio::test]
    async fn failed_symbol_does_not_abort_the_batch() {
        let client = Arc::new(MockClient::new(HashMap::from([
            ("BTC-USDT-SWAP".to_string(), trending_candles(500, 1.0)),
            ("ETH-USDT-SWAP".to_string(), trending_candles(500, 1.0)),
        ])));
        client.fail_next("ETH-USDT-SWAP", 10);
        let (engine, _) = engine_with(client);

        let response = engine
            .run(&request(&["BTC-USDT-SWAP", "ETH-USDT-SWAP"]))
            .await
            .unwrap();

        assert_eq!(response.results.len(), 2);
        // Deterministic ordering: request order.
        assert_eq!(response.results[0].symbol, "BTC-USDT-SWAP");
        assert_eq!(response.results[1].symbol, "ETH-USDT-SWAP");

        let failed = &response.results[1];
        assert_eq!(failed.label, Label::Hold);
        assert!(failed.is_error);
        assert!(failed.reason.is_some());

        assert_eq!(response.stats.error_count, 1);
        assert_eq!(response.stats.buy_count, 1);
        // The failed symbol is excluded from the aggregate stats.
        assert_eq!(response.stats.hold_count, 0);
    }

    #[tokio::test]
    async fn open_breaker_fails_symbols_fast() {
        let client = Arc::new(MockClient::new(HashMap::from([(
            "BTC-USDT-SWAP".to_string(),
            trending_candles(500, 1.0),
        )])));
        let (engine, breaker) = engine_with(client.clone());

        for _ in 0..5 {
            breaker.on_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let response = engine.run(&request(&["BTC-USDT-SWAP"])).await.unwrap();
        let result = &response.results[0];
        assert!(result.is_error);
        assert!(result.reason.as_ref().unwrap().contains("circuit open"));
        // Rejected before reaching the client.
        assert_eq!(client.calls_for("BTC-USDT-SWAP"), 0);
    }

    #[tokio::test]
    async fn completed_runs_are_retrievable_by_id() {
        let client = Arc::new(MockClient::new(HashMap::from([(
            "BTC-USDT-SWAP".to_string(),
            trending_candles(500, 1.0),
        )])));
        let (engine, _) = engine_with(client);

        let response = engine.run(&request(&["BTC-USDT-SWAP"])).await.unwrap();
        let replay = engine.get_run(&response.run_id).unwrap();
        assert_eq!(replay.run_id, response.run_id);
        assert_eq!(replay.results.len(), 1);
        assert!(engine.get_run("not-a-run").is_none());
    }
}
