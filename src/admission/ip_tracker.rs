// =============================================================================
// Per-IP Violation Tracking — decaying counters and temporary blocks
// =============================================================================
//
// Every admission violation lands in a per-IP record. Within a decaying
// 15-minute window, any of:
//
//   rate_limit_hits >= 8, validation_failures >= 5,
//   suspicious_activities >= 3, total >= 10
//
// earns a 30-minute block. Records whose last violation is older than the
// decay window (and that carry no active block) are garbage-collected by a
// periodic sweep. Metrics listings mask addresses in production.
// =============================================================================

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

const DECAY_WINDOW: Duration = Duration::from_secs(15 * 60);
const BLOCK_DURATION: Duration = Duration::from_secs(30 * 60);

const MAX_RATE_LIMIT_HITS: u32 = 8;
const MAX_VALIDATION_FAILURES: u32 = 5;
const MAX_SUSPICIOUS: u32 = 3;
const MAX_TOTAL: u32 = 10;

/// Violation categories with different blocking weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    RateLimit,
    Validation,
    Suspicious,
}

#[derive(Debug, Clone)]
pub struct IpViolationRecord {
    pub rate_limit_hits: u32,
    pub validation_failures: u32,
    pub suspicious_activities: u32,
    pub first_violation: Instant,
    pub last_violation: Instant,
    pub blocked_until: Option<Instant>,
}

impl IpViolationRecord {
    fn new(now: Instant) -> Self {
        Self {
            rate_limit_hits: 0,
            validation_failures: 0,
            suspicious_activities: 0,
            first_violation: now,
            last_violation: now,
            blocked_until: None,
        }
    }

    fn total(&self) -> u32 {
        self.rate_limit_hits + self.validation_failures + self.suspicious_activities
    }

    fn over_threshold(&self) -> bool {
        self.rate_limit_hits >= MAX_RATE_LIMIT_HITS
            || self.validation_failures >= MAX_VALIDATION_FAILURES
            || self.suspicious_activities >= MAX_SUSPICIOUS
            || self.total() >= MAX_TOTAL
    }
}

/// Serializable listing entry for metrics output.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedIpEntry {
    pub ip: String,
    pub total_violations: u32,
    pub blocked_for_secs: u64,
}

#[derive(Default)]
pub struct IpViolationTracker {
    records: RwLock<HashMap<IpAddr, IpViolationRecord>>,
}

impl IpViolationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining block time, when `ip` is currently blocked.
    pub fn blocked_remaining(&self, ip: IpAddr) -> Option<Duration> {
        let records = self.records.read();
        let until = records.get(&ip)?.blocked_until?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    /// Record one violation. Returns the block deadline when this violation
    /// tipped the IP over a threshold.
    pub fn record(&self, ip: IpAddr, violation: Violation) -> Option<Instant> {
        let now = Instant::now();
        let mut records = self.records.write();
        let record = records
            .entry(ip)
            .or_insert_with(|| IpViolationRecord::new(now));

        // Counters decay wholesale once the window has passed in silence.
        if now.duration_since(record.last_violation) >= DECAY_WINDOW {
            *record = IpViolationRecord::new(now);
        }

        match violation {
            Violation::RateLimit => record.rate_limit_hits += 1,
            Violation::Validation => record.validation_failures += 1,
            Violation::Suspicious => record.suspicious_activities += 1,
        }
        record.last_violation = now;

        let already_blocked = record
            .blocked_until
            .is_some_and(|until| until > now);

        if !already_blocked && record.over_threshold() {
            let until = now + BLOCK_DURATION;
            record.blocked_until = Some(until);
            warn!(
                ip = %ip,
                rate_limit_hits = record.rate_limit_hits,
                validation_failures = record.validation_failures,
                suspicious = record.suspicious_activities,
                block_mins = BLOCK_DURATION.as_secs() / 60,
                "IP blocked for repeated violations"
            );
            return Some(until);
        }
        None
    }

    /// Drop records past the decay window with no active block.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| {
            let blocked = r.blocked_until.is_some_and(|until| until > now);
            blocked || now.duration_since(r.last_violation) < DECAY_WINDOW
        });
        let dropped = before - records.len();
        if dropped > 0 {
            info!(dropped, remaining = records.len(), "violation records swept");
        }
    }

    /// Currently blocked IPs for metrics. `mask` hides address tails in
    /// production (IPv4 keeps the first two octets, IPv6 the first two
    /// segments).
    pub fn blocked_ips(&self, mask: bool) -> Vec<BlockedIpEntry> {
        let now = Instant::now();
        self.records
            .read()
            .iter()
            .filter_map(|(ip, r)| {
                let until = r.blocked_until?;
                if until <= now {
                    return None;
                }
                Some(BlockedIpEntry {
                    ip: if mask { mask_ip(*ip) } else { ip.to_string() },
                    total_violations: r.total(),
                    blocked_for_secs: (until - now).as_secs(),
                })
            })
            .collect()
    }

    pub fn tracked_count(&self) -> usize {
        self.records.read().len()
    }

    /// Spawn the 5-minute sweep task; exits on shutdown.
    pub fn spawn_sweep(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => tracker.cleanup(),
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("IP violation sweep task stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// Partially mask an address for production metrics output.
fn mask_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.x.x", o[0], o[1])
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            format!("{:x}:{:x}::xxxx", s[0], s[1])
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([198, 51, 100, last])
    }

    #[test]
    fn rate_limit_hits_block_at_eight() {
        let tracker = IpViolationTracker::new();
        for _ in 0..7 {
            assert!(tracker.record(ip(1), Violation::RateLimit).is_none());
        }
        assert!(tracker.record(ip(1), Violation::RateLimit).is_some());
        assert!(tracker.blocked_remaining(ip(1)).is_some());
    }

    #[test]
    fn validation_failures_block_at_five() {
        let tracker = IpViolationTracker::new();
        for _ in 0..4 {
            assert!(tracker.record(ip(2), Violation::Validation).is_none());
        }
        assert!(tracker.record(ip(2), Violation::Validation).is_some());
    }

    #[test]
    fn suspicious_activity_blocks_at_three() {
        let tracker = IpViolationTracker::new();
        assert!(tracker.record(ip(3), Violation::Suspicious).is_none());
        assert!(tracker.record(ip(3), Violation::Suspicious).is_none());
        assert!(tracker.record(ip(3), Violation::Suspicious).is_some());
    }

    #[test]
    fn mixed_violations_block_at_ten_total() {
        let tracker = IpViolationTracker::new();
        for _ in 0..5 {
            tracker.record(ip(4), Violation::RateLimit);
        }
        for _ in 0..4 {
            tracker.record(ip(4), Violation::Validation);
        }
        // 9 total so far, all individual thresholds untouched.
        assert!(tracker.blocked_remaining(ip(4)).is_none());
        assert!(tracker.record(ip(4), Violation::RateLimit).is_some());
    }

    #[test]
    fn unblocked_ips_are_not_listed() {
        let tracker = IpViolationTracker::new();
        tracker.record(ip(5), Violation::RateLimit);
        assert!(tracker.blocked_ips(false).is_empty());
        assert!(tracker.blocked_remaining(ip(5)).is_none());
    }

    #[test]
    fn blocked_listing_masks_in_production_mode() {
        let tracker = IpViolationTracker::new();
        for _ in 0..3 {
            tracker.record(ip(6), Violation::Suspicious);
        }

        let raw = tracker.blocked_ips(false);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].ip, "198.51.100.6");

        let masked = tracker.blocked_ips(true);
        assert_eq!(masked[0].ip, "198.51.x.x");
    }

    #[test]
    fn cleanup_keeps_blocked_and_recent_records() {
        let tracker = IpViolationTracker::new();
        tracker.record(ip(7), Violation::RateLimit); // recent, unblocked
        for _ in 0..3 {
            tracker.record(ip(8), Violation::Suspicious); // blocked
        }
        tracker.cleanup();
        assert_eq!(tracker.tracked_count(), 2);
    }

    #[test]
    fn ipv6_masking() {
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(mask_ip(v6), "2001:db8::xxxx");
    }
}
