// =============================================================================
// ErrorAlerter — sliding-window error accounting with cooldown-gated alerts
// =============================================================================
//
// Tracks error responses (HTTP >= 400) over a 5-minute sliding window.
// Thresholds, whichever trips first:
//
//   5xx >= 10,  429 >= 20,  total >= 25
//
// Severity at alert time: CRITICAL at 5xx >= 15 or total >= 35, HIGH at
// 5xx >= 5 or total >= 15, else WARNING. Alerts carry the counts, the
// latest error, up to five recently affected endpoints, a timestamp, and
// the environment tag. A 15-minute cooldown separates alerts, and all
// window state resets after one fires. The notifier call happens outside
// the window lock.
// =============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::alerts::notifier::{Notifier, Severity};

const WINDOW: Duration = Duration::from_secs(5 * 60);
const COOLDOWN: Duration = Duration::from_secs(15 * 60);

const THRESHOLD_5XX: usize = 10;
const THRESHOLD_429: usize = 20;
const THRESHOLD_TOTAL: usize = 25;

struct ErrorEvent {
    at: Instant,
    status: u16,
    endpoint: String,
}

struct AlerterState {
    events: VecDeque<ErrorEvent>,
    last_alert_at: Option<Instant>,
}

/// Fully composed alert, ready for the notifier.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub severity: Severity,
    pub count_5xx: usize,
    pub count_429: usize,
    pub count_total: usize,
    pub latest_status: u16,
    pub latest_endpoint: String,
    pub recent_endpoints: Vec<String>,
    pub environment: String,
    pub at: String,
}

impl Alert {
    fn message(&self) -> String {
        format!(
            "[{}] error burst in {}: {} errors in 5m ({} 5xx, {} 429); latest {} on {}; endpoints: {}",
            self.severity,
            self.environment,
            self.count_total,
            self.count_5xx,
            self.count_429,
            self.latest_status,
            self.latest_endpoint,
            self.recent_endpoints.join(", "),
        )
    }
}

pub struct ErrorAlerter {
    state: Mutex<AlerterState>,
    notifier: Arc<dyn Notifier>,
    environment: String,
    window: Duration,
    cooldown: Duration,
}

impl ErrorAlerter {
    pub fn new(notifier: Arc<dyn Notifier>, environment: impl Into<String>) -> Self {
        Self::with_timing(notifier, environment, WINDOW, COOLDOWN)
    }

    /// Constructor with explicit window/cooldown, for tests and tuning.
    pub fn with_timing(
        notifier: Arc<dyn Notifier>,
        environment: impl Into<String>,
        window: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(AlerterState {
                events: VecDeque::new(),
                last_alert_at: None,
            }),
            notifier,
            environment: environment.into(),
            window,
            cooldown,
        }
    }

    /// Feed one response status. Non-error statuses are ignored. When the
    /// window crosses a threshold (and the cooldown allows), the composed
    /// alert is dispatched on a separate task so the caller never waits on
    /// the notifier.
    pub fn record_response(&self, status: u16, endpoint: &str) {
        if let Some(alert) = self.observe(status, endpoint) {
            let notifier = self.notifier.clone();
            let message = alert.message();
            let severity = alert.severity;
            tokio::spawn(async move {
                notifier.notify(severity, &message).await;
            });
        }
    }

    /// Window bookkeeping and threshold evaluation. Returns the alert to
    /// dispatch, if one is due. The lock is released before any I/O.
    pub fn observe(&self, status: u16, endpoint: &str) -> Option<Alert> {
        if status < 400 {
            return None;
        }

        let now = Instant::now();
        let mut state = self.state.lock();

        // Sliding window: decay events older than the window.
        while state
            .events
            .front()
            .is_some_and(|e| now.duration_since(e.at) > self.window)
        {
            state.events.pop_front();
        }

        state.events.push_back(ErrorEvent {
            at: now,
            status,
            endpoint: endpoint.to_string(),
        });

        let count_5xx = state.events.iter().filter(|e| e.status >= 500).count();
        let count_429 = state.events.iter().filter(|e| e.status == 429).count();
        let count_total = state.events.len();

        let threshold_hit = count_5xx >= THRESHOLD_5XX
            || count_429 >= THRESHOLD_429
            || count_total >= THRESHOLD_TOTAL;
        if !threshold_hit {
            return None;
        }

        let cooling = state
            .last_alert_at
            .is_some_and(|at| now.duration_since(at) < self.cooldown);
        if cooling {
            debug!(count_total, "alert threshold hit during cooldown");
            return None;
        }

        let severity = if count_5xx >= 15 || count_total >= 35 {
            Severity::Critical
        } else if count_5xx >= 5 || count_total >= 15 {
            Severity::High
        } else {
            Severity::Warning
        };

        // Up to five distinct endpoints, most recent first.
        let mut recent_endpoints: Vec<String> = Vec::new();
        for event in state.events.iter().rev() {
            if !recent_endpoints.contains(&event.endpoint) {
                recent_endpoints.push(event.endpoint.clone());
                if recent_endpoints.len() == 5 {
                    break;
                }
            }
        }

        let latest = state.events.back().expect("just pushed");
        let alert = Alert {
            severity,
            count_5xx,
            count_429,
            count_total,
            latest_status: latest.status,
            latest_endpoint: latest.endpoint.clone(),
            recent_endpoints,
            environment: self.environment.clone(),
            at: chrono::Utc::now().to_rfc3339(),
        };

        // Full reset after an alert fires.
        state.events.clear();
        state.last_alert_at = Some(now);

        Some(alert)
    }

    /// Window counters for the metrics endpoint.
    pub fn window_counts(&self) -> (usize, usize, usize) {
        let now = Instant::now();
        let mut state = self.state.lock();
        while state
            .events
            .front()
            .is_some_and(|e| now.duration_since(e.at) > self.window)
        {
            state.events.pop_front();
        }
        let count_5xx = state.events.iter().filter(|e| e.status >= 500).count();
        let count_429 = state.events.iter().filter(|e| e.status == 429).count();
        (count_5xx, count_429, state.events.len())
    }
}
