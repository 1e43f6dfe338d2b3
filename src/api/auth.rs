// =============================================================================
// API-Key Authentication — Axum extractor
// =============================================================================
//
// Validates the `X-API-Key` header against the configured key set. The
// comparison is performed in constant time per candidate key so a mismatch
// reveals nothing about how far the comparison got.
//
// Usage:
//
//   async fn handler(ApiKey(key): ApiKey, ...) { ... }
//
// A missing or unknown key short-circuits the request with
// 401 { "error": "UNAUTHORIZED" } before the handler body executes.
// =============================================================================

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::warn;

use crate::app_state::AppState;
use crate::errors::ScreenerError;

/// Compare two byte slices in constant time. Always examines every byte of
/// equal-length inputs even when a mismatch is found early.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Check a presented key against the configured set.
pub fn is_valid_key(presented: &str, configured: &[String]) -> bool {
    configured
        .iter()
        .any(|key| constant_time_eq(presented.as_bytes(), key.as_bytes()))
}

/// Extractor yielding the validated API key (useful for audit logging).
pub struct ApiKey(pub String);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for ApiKey {
    type Rejection = ScreenerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let configured = &state.config.api_keys;
        if configured.is_empty() {
            warn!("no API keys configured, rejecting authenticated request");
            return Err(ScreenerError::Unauthorized);
        }

        let presented = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if presented.is_empty() || !is_valid_key(presented, configured) {
            warn!("missing or unknown API key");
            return Err(ScreenerError::Unauthorized);
        }

        Ok(ApiKey(presented.to_string()))
    }
}
