// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/screener/`. The health endpoint is public
// and admission-exempt; everything else requires a valid `X-API-Key` and
// passes through the admission middleware (rate limiting, validation, IP
// blocking) layered onto the router.
//
// Handlers return `Result<Json<...>, ScreenerError>`; the error type renders
// the response envelope exactly once at this edge.
// =============================================================================

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Json, Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use crate::admission::{admission_middleware, ClientIp, Violation};
use crate::api::auth::ApiKey;
use crate::app_state::AppState;
use crate::errors::ScreenerError;
use crate::lifecycle::{PublishedEvent, Side};
use crate::screener::{Label, ScreenerRequest, ScreenerResponse};

/// Rules version stamped onto published signal events.
const RULES_VERSION: &str = "helix-v1";

/// Default risk:reward target attached to published signals.
const DEFAULT_RR_TARGET: f64 = 2.0;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST router with admission + CORS middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/screener/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/screener/run", post(run_screener))
        .route("/api/screener/multi", post(run_screener))
        .route("/api/screener/supported-symbols", get(supported_symbols))
        .route("/api/screener/metrics", get(metrics))
        .route("/api/screener/:run_id", get(run_by_id))
        // ── Middleware & State ──────────────────────────────────────
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admission_middleware,
        ))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public, admission-exempt)
// =============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "ts": chrono::Utc::now().timestamp_millis(),
    }))
}

// =============================================================================
// Screening runs
// =============================================================================

async fn run_screener(
    _auth: ApiKey,
    State(state): State<Arc<AppState>>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    body: Result<Json<ScreenerRequest>, JsonRejection>,
) -> Result<Json<ScreenerResponse>, ScreenerError> {
    let Json(request) = body.map_err(|rejection| {
        state.admission.record_violation(ip, Violation::Validation);
        ScreenerError::Validation {
            details: rejection.body_text(),
        }
    })?;

    let response = state.engine.run(&request).await.map_err(|e| {
        if matches!(e, ScreenerError::Validation { .. }) {
            state.admission.record_violation(ip, Violation::Validation);
        }
        e
    })?;

    publish_signals(&state, &response);
    Ok(Json(response))
}

/// Emit `published` lifecycle events for actionable verdicts. Best-effort:
/// the emitter no-ops when the feature is off and absorbs every failure.
fn publish_signals(state: &Arc<AppState>, response: &ScreenerResponse) {
    for result in &response.results {
        let Some(confluence) = &result.confluence else {
            continue;
        };
        let side = match result.label {
            Label::Buy => Side::Long,
            Label::Sell => Side::Short,
            Label::Hold => continue,
        };
        state.emitter.publish(PublishedEvent {
            signal_id: format!("{}:{}", response.run_id, result.symbol),
            symbol: result.symbol.clone(),
            side,
            confluence_score: confluence.normalized_score as f64 / 100.0,
            rr_target: DEFAULT_RR_TARGET,
            expiry_minutes: 240,
            rules_version: RULES_VERSION.to_string(),
            ts_published: response.timestamp,
        });
    }
}

async fn run_by_id(
    _auth: ApiKey,
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    match state.engine.get_run(&run_id) {
        Some(run) => Json(run).into_response(),
        None => {
            debug!(run_id, "unknown run id requested");
            (
                axum::http::StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "error": "NOT_FOUND",
                    "message": "unknown or expired run id",
                })),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Supporting endpoints
// =============================================================================

async fn supported_symbols(
    _auth: ApiKey,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(serde_json::json!({ "symbols": state.config.symbols }))
}

async fn metrics(_auth: ApiKey, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.metrics_snapshot())
}
