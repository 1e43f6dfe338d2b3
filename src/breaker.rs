// =============================================================================
// Circuit Breaker — closed / open / half-open protection for sub-services
// =============================================================================
//
// Transitions:
//   closed    -> open      failure_count >= failure_threshold
//   open      -> half-open reset_timeout elapsed since the last failure,
//                          checked on the next admission attempt
//   half-open -> closed    success_count >= half_open_success_threshold
//   half-open -> open      any failure while probing
//   closed success         failure_count = max(0, failure_count - 1)
//
// Half-open admits at most `half_open_max_calls` concurrent probes; everyone
// else is rejected exactly as if the breaker were open. All transitions are
// serialized behind one mutex per breaker.
// =============================================================================

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "halfOpen"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub half_open_max_calls: u32,
    pub half_open_success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
            half_open_success_threshold: 3,
        }
    }
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
    half_open_in_flight: u32,
}

/// Serializable view of the breaker for metrics/diagnostics endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub seconds_since_last_failure: Option<f64>,
}

/// Outcome of a protected call.
#[derive(Debug)]
pub enum BreakerError {
    /// Rejected without running the operation.
    Open,
    /// The operation ran and failed; the failure was recorded.
    Inner(anyhow::Error),
}

impl std::fmt::Display for BreakerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "circuit open"),
            Self::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BreakerError {}

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
                half_open_in_flight: 0,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            seconds_since_last_failure: inner.last_failure_at.map(|t| t.elapsed().as_secs_f64()),
        }
    }

    /// Run `op` under breaker protection.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, BreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if !self.try_acquire() {
            return Err(BreakerError::Open);
        }

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Admission & recording
    // -------------------------------------------------------------------------

    /// Admission check. Open breakers flip to half-open once the reset
    /// timeout has elapsed; half-open admits a bounded number of probes.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = inner
                    .last_failure_at
                    .map(|t| t.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if cooled {
                    info!(breaker = %self.name, "reset timeout elapsed, probing half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    inner.half_open_in_flight = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max_calls {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = inner.failure_count.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.success_count += 1;
                if inner.success_count >= self.config.half_open_success_threshold {
                    info!(breaker = %self.name, "probes succeeded, closing circuit");
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.half_open_in_flight = 0;
                }
            }
            // A probe that started before a concurrent failure re-opened the
            // circuit; its success no longer matters.
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "failure threshold reached, opening circuit"
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "probe failed, re-opening circuit");
                inner.state = CircuitState::Open;
                inner.half_open_in_flight = 0;
                inner.success_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Response-interceptor variant: classify an HTTP status code observed
    /// on a protected edge. 2xx/3xx succeed, 5xx and 429 fail, other 4xx are
    /// neither (caller errors say nothing about the service's health).
    pub fn record_status(&self, status: u16) {
        if (200..400).contains(&status) {
            self.on_success();
        } else if status >= 500 || status == 429 {
            self.on_failure();
        } else {
            debug!(breaker = %self.name, status, "4xx ignored by breaker");
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Process-wide registry of named breakers, created during init and injected
/// by `Arc`. `get_or_create` makes sub-service protection cheap to adopt.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(b) = self.breakers.read().get(name) {
            return b.clone();
        }
        let mut map = self.breakers.write();
        map.entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers
            .read()
            .values()
            .map(|b| b.snapshot())
            .collect()
    }
}
