// =============================================================================
// Error Kinds — typed request-path errors, rendered once at the HTTP edge
// =============================================================================
//
// Components return `ScreenerError` variants (or absorb failures into
// per-symbol results); only the axum layer turns them into wire responses.
// 4xx bodies carry a machine-readable `error` code and a short message. 5xx
// bodies stay generic; details go to the error alerter, not the caller.
// =============================================================================

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScreenerError {
    /// Malformed request. Reported as 400, never counted as a system failure.
    #[error("validation failed: {details}")]
    Validation { details: String },

    /// Missing or unknown API key.
    #[error("unauthorized")]
    Unauthorized,

    /// Admission denial, either a tier breach or an active IP block.
    #[error("rate limited on tier {tier}")]
    RateLimited { tier: String, retry_after_secs: u64 },

    /// The circuit breaker is refusing calls to the upstream.
    #[error("circuit open")]
    CircuitOpen,

    /// Upstream fetch failed after the retry policy was exhausted.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Not enough candles to run the indicator stack.
    #[error("insufficient data")]
    DataInsufficient,

    /// Anything unexpected. 500, counted by the error alerter.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScreenerError {
    /// The machine-readable code carried in response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::Upstream(_) => "UPSTREAM_FAILURE",
            Self::DataInsufficient => "DATA_INSUFFICIENT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            // Whole-request breaker/upstream failures only occur when every
            // symbol failed; surface them as an upstream problem.
            Self::CircuitOpen | Self::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DataInsufficient => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ScreenerError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ScreenerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation { details } => serde_json::json!({
                "error": self.code(),
                "details": details,
            }),
            Self::RateLimited {
                tier,
                retry_after_secs,
            } => serde_json::json!({
                "error": self.code(),
                "tier": tier,
                "retryAfter": retry_after_secs,
            }),
            // Internal errors never leak details to the caller.
            Self::Internal(_) => serde_json::json!({
                "error": self.code(),
                "message": "internal error",
            }),
            other => serde_json::json!({
                "error": other.code(),
                "message": other.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}
