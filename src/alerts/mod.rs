// =============================================================================
// Alerting — operator notification pipeline
// =============================================================================

pub mod error_alerter;
pub mod notifier;

pub use error_alerter::{Alert, ErrorAlerter};
pub use notifier::{LogNotifier, Notifier, Severity, WebhookNotifier};
