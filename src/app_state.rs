// =============================================================================
// Central Application State — Helix Screener
// =============================================================================
//
// The single composition point for the service. Process-wide singletons
// (caches, breaker registry, admission layer, alerter, lifecycle emitter)
// are created here during init, handed to components via Arc, and drained
// through `spawn_background_tasks`'s shutdown receiver on the way out.
//
// Thread safety:
//   - parking_lot locks inside each component; AppState itself is immutable
//     after construction.
//   - Everything request-scoped lives in the engine's per-run state.
// =============================================================================

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::admission::{AdmissionLayer, IpViolationTracker};
use crate::alerts::{ErrorAlerter, Notifier};
use crate::breaker::{BreakerConfig, BreakerRegistry, CircuitBreaker};
use crate::cache::SmartCache;
use crate::config::ScreenerConfig;
use crate::lifecycle::{EventLog, SignalEmitter, WeeklyScorecard};
use crate::market_data::MarketDataClient;
use crate::screener::{ScreenerResponse, ScreeningEngine, SymbolResult};

/// Cache cleanup cadence.
const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
/// IP violation sweep cadence.
const IP_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct AppState {
    pub config: ScreenerConfig,
    pub engine: ScreeningEngine,
    pub admission: AdmissionLayer,
    pub alerter: ErrorAlerter,
    pub emitter: SignalEmitter,
    pub breakers: BreakerRegistry,
    pub market_breaker: Arc<CircuitBreaker>,
    pub result_cache: Arc<SmartCache<SymbolResult>>,
    pub run_cache: Arc<SmartCache<ScreenerResponse>>,
    pub scorecard: Option<Arc<WeeklyScorecard>>,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire every subsystem together. The market-data client and notifier
    /// are injected so tests can substitute doubles.
    pub fn new(
        config: ScreenerConfig,
        client: Arc<dyn MarketDataClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let breakers = BreakerRegistry::new();
        let market_breaker = breakers.get_or_create("market-data", BreakerConfig::default());

        let result_cache = Arc::new(SmartCache::new(
            "screener-results",
            config.max_cache_items,
            config.max_cache_bytes,
            Duration::from_secs(config.cache_ttl_secs),
        ));
        let run_cache = Arc::new(SmartCache::new(
            "screener-runs",
            config.max_cache_items,
            config.max_cache_bytes,
            Duration::from_secs(config.run_cache_ttl_secs),
        ));

        let engine = ScreeningEngine::new(
            &config,
            client,
            market_breaker.clone(),
            result_cache.clone(),
            run_cache.clone(),
        );

        let trusted_proxies: Vec<IpAddr> = config
            .trusted_proxies
            .iter()
            .filter_map(|raw| match raw.parse() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    warn!(raw = %raw, "unparseable trusted proxy address ignored");
                    None
                }
            })
            .collect();
        let admission = AdmissionLayer::new(
            config.environment,
            trusted_proxies,
            Arc::new(IpViolationTracker::new()),
        );

        let alerter = ErrorAlerter::new(notifier.clone(), config.environment.to_string());

        // Event log + scorecard only exist with a configured database.
        let event_log = match &config.database_path {
            Some(path) => match EventLog::open(path) {
                Ok(log) => Some(Arc::new(log)),
                Err(e) => {
                    warn!(path = %path, error = %e, "event log unavailable, lifecycle emission disabled");
                    None
                }
            },
            None => None,
        };
        let emitter = SignalEmitter::new(event_log.clone(), config.event_log_enabled);
        let scorecard =
            event_log.map(|log| Arc::new(WeeklyScorecard::new(log, notifier)));

        Self {
            config,
            engine,
            admission,
            alerter,
            emitter,
            breakers,
            market_breaker,
            result_cache,
            run_cache,
            scorecard,
            start_time: std::time::Instant::now(),
        }
    }

    /// Launch the long-lived maintenance tasks. Each takes the shutdown
    /// receiver and exits within the drain grace window.
    pub fn spawn_background_tasks(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = vec![
            self.result_cache
                .spawn_cleanup(CACHE_CLEANUP_INTERVAL, shutdown.clone()),
            self.run_cache
                .spawn_cleanup(CACHE_CLEANUP_INTERVAL, shutdown.clone()),
            self.admission
                .tracker()
                .spawn_sweep(IP_SWEEP_INTERVAL, shutdown.clone()),
        ];

        if let Some(scorecard) = &self.scorecard {
            handles.push(scorecard.clone().spawn_schedule(shutdown));
        }

        info!(tasks = handles.len(), "background tasks launched");
        handles
    }

    /// Operational snapshot for the metrics endpoint.
    pub fn metrics_snapshot(&self) -> serde_json::Value {
        let (count_5xx, count_429, count_total) = self.alerter.window_counts();
        serde_json::json!({
            "uptime_secs": self.start_time.elapsed().as_secs(),
            "caches": {
                "results": self.result_cache.stats(),
                "runs": self.run_cache.stats(),
            },
            "breakers": self.breakers.snapshots(),
            "admission": {
                "tracked_windows": self.admission.limiter().tracked_keys(),
                "tracked_ips": self.admission.tracker().tracked_count(),
                "blocked": self.admission.blocked_ips_for_metrics(),
            },
            "errors": {
                "window_5xx": count_5xx,
                "window_429": count_429,
                "window_total": count_total,
            },
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LogNotifier;
    use crate::market_data::{MarketSnapshot, Timeframe};
    use async_trait::async_trait;

    struct NullClient;

    #[async_trait]
    impl MarketDataClient for NullClient {
        async fn fetch(
            &self,
            symbol: &str,
            timeframe: Timeframe,
            _limit: u32,
        ) -> anyhow::Result<MarketSnapshot> {
            Ok(MarketSnapshot {
                symbol: symbol.to_string(),
                timeframe,
                candles: Vec::new(),
                derivatives: Default::default(),
            })
        }
    }

    fn state() -> AppState {
        AppState::new(
            ScreenerConfig::default(),
            Arc::new(NullClient),
            Arc::new(LogNotifier),
        )
    }

    #[test]
    fn default_state_has_no_lifecycle_backend() {
        let s = state();
        assert!(s.scorecard.is_none());
        // Emission is a silent no-op without a database.
        s.emitter.publish(crate::lifecycle::PublishedEvent {
            signal_id: "sig".into(),
            symbol: "BTC-USDT-SWAP".into(),
            side: crate::lifecycle::Side::Long,
            confluence_score: 0.7,
            rr_target: 2.0,
            expiry_minutes: 240,
            rules_version: "v1".into(),
            ts_published: 1,
        });
    }

    #[test]
    fn metrics_snapshot_shape() {
        let s = state();
        let snapshot = s.metrics_snapshot();
        assert!(snapshot["caches"]["results"]["hits"].is_u64());
        assert!(snapshot["breakers"].is_array());
        assert!(snapshot["admission"]["blocked"].is_array());
    }

    #[tokio::test]
    async fn background_tasks_stop_on_shutdown() {
        let s = state();
        let (tx, rx) = watch::channel(false);
        let handles = s.spawn_background_tasks(rx);
        assert_eq!(handles.len(), 3);

        tx.send(true).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("task did not drain in time")
                .unwrap();
        }
    }
}
