// =============================================================================
// Tiered Rate Limiter — fixed-window counters per (tier, client IP)
// =============================================================================
//
// Every path resolves to exactly one tier; the strictest matches are checked
// first so the confluence-screening endpoints never fall through to the
// looser AI tier they also textually match. All windows are 60 seconds.
//
// The counter-then-check order means a window admits at most `limit`
// requests and the breaching request itself is the one that sees the 429.
// =============================================================================

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;

pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    ConfluenceScreening,
    AiAnalysis,
    Sensitive,
    Auth,
    General,
}

impl Tier {
    /// Resolve the tier for a request path. Most-specific fragment wins.
    pub fn for_path(path: &str) -> Tier {
        let p = path.to_lowercase();

        // The /run and /multi aliases of the consolidated /api/screener
        // prefix are the confluence endpoints of the legacy
        // /api/screening/confluence path; all three land in the strictest
        // tier.
        if p.contains("screening/confluence")
            || p.contains("screener/run")
            || p.contains("screener/multi")
        {
            return Tier::ConfluenceScreening;
        }
        if p.contains("ai") || p.contains("signal") || p.contains("screener") || p.contains("analysis")
        {
            return Tier::AiAnalysis;
        }
        if p.contains("complete") || p.contains("orderbook") || p.contains("multi-exchange") {
            return Tier::Sensitive;
        }
        if p.contains("auth") || p.contains("login") {
            return Tier::Auth;
        }
        Tier::General
    }

    pub fn limit(&self) -> u32 {
        match self {
            Tier::ConfluenceScreening => 3,
            Tier::AiAnalysis => 5,
            Tier::Sensitive => 10,
            Tier::Auth => 5,
            Tier::General => 100,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tier::ConfluenceScreening => "confluence_screening",
            Tier::AiAnalysis => "ai_analysis",
            Tier::Sensitive => "sensitive",
            Tier::Auth => "auth",
            Tier::General => "general",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

struct WindowCounter {
    window_start: Instant,
    count: u32,
}

/// Outcome of one admission count.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub tier: Tier,
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp (seconds) when the current window resets.
    pub reset_at_unix: u64,
    pub retry_after_secs: u64,
}

/// Fixed-window limiter keyed by `(tier, ip)`.
#[derive(Default)]
pub struct FixedWindowLimiter {
    windows: Mutex<HashMap<(Tier, IpAddr), WindowCounter>>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request against its window and decide admission.
    pub fn check(&self, tier: Tier, ip: IpAddr) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let counter = windows.entry((tier, ip)).or_insert(WindowCounter {
            window_start: now,
            count: 0,
        });

        if now.duration_since(counter.window_start) >= WINDOW {
            counter.window_start = now;
            counter.count = 0;
        }

        counter.count += 1;
        let limit = tier.limit();
        let allowed = counter.count <= limit;
        let remaining = limit.saturating_sub(counter.count);
        let window_remaining = WINDOW.saturating_sub(now.duration_since(counter.window_start));

        let reset_at_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() + window_remaining.as_secs())
            .unwrap_or(0);

        RateLimitDecision {
            allowed,
            tier,
            limit,
            remaining,
            reset_at_unix,
            retry_after_secs: window_remaining.as_secs().max(1),
        }
    }

    /// Drop windows that have been idle for more than two full windows.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.windows
            .lock()
            .retain(|_, c| now.duration_since(c.window_start) < WINDOW * 2);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}
