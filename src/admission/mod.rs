// =============================================================================
// Admission Layer — tiered rate limiting, validation, IP blocking
// =============================================================================
//
// Order of checks for every request:
//   1. Exemptions (health/metrics/openapi/static paths, loopback, private
//      ranges in development).
//   2. Active IP block => 429 with a retry hint.
//   3. Fixed-window tier counter; a breach records a violation and answers
//      429 with the standard RateLimit headers.
//   4. Query-string validation: attack signatures count as suspicious
//      activity, oversize parameters as validation failures; both reject
//      with 400.
//
// The axum middleware at the bottom glues the checks onto the router and
// stamps RateLimit-* headers on admission-controlled responses. Response
// statuses are fed to the error alerter on the way out.
// =============================================================================

pub mod ip_tracker;
pub mod rate_limit;
pub mod validator;

pub use ip_tracker::{IpViolationTracker, Violation};
pub use rate_limit::{FixedWindowLimiter, RateLimitDecision, Tier};

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use crate::app_state::AppState;
use crate::config::Environment;
use crate::errors::ScreenerError;
use validator::InputViolation;

/// Resolved client address, stashed in request extensions for handlers that
/// need to attribute violations.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub IpAddr);

/// Outcome of the admission pipeline for one request.
#[derive(Debug, Clone)]
pub enum AdmissionDecision {
    /// Path or source is exempt; no counting, no headers.
    Exempt,
    Allowed(RateLimitDecision),
    Limited(RateLimitDecision),
    Blocked { tier: Tier, retry_after_secs: u64 },
}

pub struct AdmissionLayer {
    limiter: FixedWindowLimiter,
    tracker: Arc<IpViolationTracker>,
    environment: Environment,
    trusted_proxies: Vec<IpAddr>,
}

impl AdmissionLayer {
    pub fn new(
        environment: Environment,
        trusted_proxies: Vec<IpAddr>,
        tracker: Arc<IpViolationTracker>,
    ) -> Self {
        Self {
            limiter: FixedWindowLimiter::new(),
            tracker,
            environment,
            trusted_proxies,
        }
    }

    pub fn tracker(&self) -> &Arc<IpViolationTracker> {
        &self.tracker
    }

    pub fn limiter(&self) -> &FixedWindowLimiter {
        &self.limiter
    }

    /// Resolve the client IP, honoring X-Forwarded-For only when the socket
    /// peer is a configured trusted proxy.
    pub fn resolve_client_ip(&self, peer: IpAddr, forwarded_for: Option<&str>) -> IpAddr {
        if !self.trusted_proxies.contains(&peer) {
            return peer;
        }
        forwarded_for
            .and_then(|raw| raw.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok())
            .unwrap_or(peer)
    }

    /// Paths outside admission control entirely.
    pub fn is_exempt_path(path: &str) -> bool {
        const EXEMPT: &[&str] = &["/health", "/metrics", "/openapi", "/static", "/favicon"];
        EXEMPT.iter().any(|frag| path.contains(frag))
    }

    fn is_exempt_source(&self, ip: IpAddr) -> bool {
        if ip.is_loopback() {
            return true;
        }
        self.environment == Environment::Development && is_private_ip(ip)
    }

    /// Run the admission pipeline (steps 1-3) for one request.
    pub fn check(&self, ip: IpAddr, path: &str) -> AdmissionDecision {
        if Self::is_exempt_path(path) || self.is_exempt_source(ip) {
            return AdmissionDecision::Exempt;
        }

        let tier = Tier::for_path(path);

        if let Some(remaining) = self.tracker.blocked_remaining(ip) {
            return AdmissionDecision::Blocked {
                tier,
                retry_after_secs: remaining.as_secs().max(1),
            };
        }

        let decision = self.limiter.check(tier, ip);
        if decision.allowed {
            AdmissionDecision::Allowed(decision)
        } else {
            self.tracker.record(ip, Violation::RateLimit);
            warn!(ip = %ip, tier = %tier, "rate limit breached");
            AdmissionDecision::Limited(decision)
        }
    }

    /// Record a request-content violation (step 4 and handler-level schema
    /// failures).
    pub fn record_violation(&self, ip: IpAddr, violation: Violation) {
        // Exempt sources never accumulate violations.
        if self.is_exempt_source(ip) {
            return;
        }
        self.tracker.record(ip, violation);
    }

    pub fn blocked_ips_for_metrics(&self) -> Vec<ip_tracker::BlockedIpEntry> {
        self.tracker
            .blocked_ips(self.environment == Environment::Production)
    }
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 10
                || (o[0] == 172 && (16..=31).contains(&o[1]))
                || (o[0] == 192 && o[1] == 168)
        }
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

// =============================================================================
// Axum middleware
// =============================================================================

/// Admission middleware: runs the pipeline, renders 4xx denials, stamps
/// RateLimit headers on admitted responses, and feeds response statuses to
/// the error alerter.
pub async fn admission_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let admission = &state.admission;
    let ip = admission.resolve_client_ip(addr.ip(), forwarded.as_deref());
    req.extensions_mut().insert(ClientIp(ip));

    let decision = admission.check(ip, &path);

    let response = match decision {
        AdmissionDecision::Blocked {
            tier,
            retry_after_secs,
        } => rate_limited_response(tier, tier.limit(), retry_after_secs, None),
        AdmissionDecision::Limited(d) => {
            let mut resp =
                rate_limited_response(d.tier, d.limit, d.retry_after_secs, Some(d.reset_at_unix));
            stamp_rate_limit_headers(&mut resp, &d);
            resp
        }
        AdmissionDecision::Allowed(d) => {
            if let Some(denied) = validate_query(&state, ip, &req) {
                denied
            } else {
                let mut resp = next.run(req).await;
                stamp_rate_limit_headers(&mut resp, &d);
                resp
            }
        }
        AdmissionDecision::Exempt => next.run(req).await,
    };

    state
        .alerter
        .record_response(response.status().as_u16(), &path);
    response
}

/// Step 4: query-string validation. Returns a rendered rejection when the
/// request must not reach its handler.
fn validate_query(state: &Arc<AppState>, ip: IpAddr, req: &Request) -> Option<Response> {
    let query = req.uri().query().unwrap_or("");
    match validator::scan_text(query) {
        None => None,
        Some(InputViolation::Signature(sig)) => {
            warn!(ip = %ip, signature = sig, "attack signature in query string");
            state.admission.record_violation(ip, Violation::Suspicious);
            Some(
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "VALIDATION_ERROR",
                        "details": "query contains a disallowed pattern",
                    })),
                )
                    .into_response(),
            )
        }
        Some(InputViolation::Oversize { length }) => {
            state.admission.record_violation(ip, Violation::Validation);
            Some(
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "VALIDATION_ERROR",
                        "details": format!("parameter length {length} exceeds {}", validator::MAX_PARAM_LEN),
                    })),
                )
                    .into_response(),
            )
        }
    }
}

fn rate_limited_response(
    tier: Tier,
    limit: u32,
    retry_after_secs: u64,
    reset_at_unix: Option<u64>,
) -> Response {
    let error = ScreenerError::RateLimited {
        tier: tier.name().to_string(),
        retry_after_secs,
    };
    let mut resp = (
        error.status(),
        Json(serde_json::json!({
            "error": error.code(),
            "tier": tier.name(),
            "limit": limit,
            "windowMs": rate_limit::WINDOW.as_millis() as u64,
            "retryAfter": retry_after_secs,
        })),
    )
        .into_response();

    let headers = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
        headers.insert("Retry-After", v);
    }
    if let Some(reset) = reset_at_unix {
        if let Ok(v) = HeaderValue::from_str(&reset.to_string()) {
            headers.insert("RateLimit-Reset", v);
        }
    }
    resp
}

fn stamp_rate_limit_headers(resp: &mut Response, decision: &RateLimitDecision) {
    let headers = resp.headers_mut();
    let pairs = [
        ("RateLimit-Limit", decision.limit.to_string()),
        ("RateLimit-Remaining", decision.remaining.to_string()),
        ("RateLimit-Reset", decision.reset_at_unix.to_string()),
        (
            "RateLimit-Policy",
            format!("{};w={}", decision.limit, rate_limit::WINDOW.as_secs()),
        ),
        ("X-RateLimit-Tier", decision.tier.name().to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(v) = HeaderValue::from_str(&value) {
            headers.insert(name, v);
        }
    }
}
