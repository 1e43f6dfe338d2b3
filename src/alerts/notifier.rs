// =============================================================================
// Notifier — best-effort operator notification transport
// =============================================================================
//
// The platform's actual transport (Telegram, pager, ...) sits behind this
// trait; the service only assumes `notify(severity, message)` and tolerates
// total failure. Failures are logged and swallowed, never propagated into
// request paths.
// =============================================================================

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Warning,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "WARNING"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification. Best-effort: implementations log failures and
    /// return normally.
    async fn notify(&self, severity: Severity, message: &str);
}

/// Fallback notifier: alerts land in the structured log only.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Warning => warn!(alert = message, "operator alert"),
            Severity::High | Severity::Critical => {
                error!(severity = %severity, alert = message, "operator alert")
            }
        }
    }
}

/// POSTs alerts as JSON to a configured webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .expect("failed to build reqwest client for WebhookNotifier"),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, severity: Severity, message: &str) {
        let payload = serde_json::json!({
            "severity": severity,
            "message": message,
            "ts": chrono::Utc::now().to_rfc3339(),
        });

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(severity = %severity, "alert delivered to webhook");
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "webhook rejected alert");
            }
            Err(e) => {
                warn!(error = %e, "webhook alert delivery failed");
            }
        }
    }
}
