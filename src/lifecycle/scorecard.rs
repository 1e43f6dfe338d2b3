// =============================================================================
// Weekly Scorecard — calibration report binned by confluence score
// =============================================================================
//
// Once a week (Asia/Jakarta weeks, Monday 00:00 WIB) the scorecard job
// computes the winrate of closed signals per confluence bin:
//
//   0.50-0.59, 0.60-0.69, 0.70-0.79, >= 0.80
//
// Calibration is healthy when winrate is non-decreasing across populated
// bins; a violation means higher-confluence signals are NOT winning more
// often, and the operator gets a degraded notification. Results upsert into
// the `weekly_scorecard` table.
//
// Execution is single-flight: overlapping triggers (scheduler + manual)
// coalesce into one run.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::alerts::notifier::{Notifier, Severity};
use crate::lifecycle::event_log::EventLog;

/// WIB is a fixed UTC+7 offset; Indonesia observes no DST.
const WIB_OFFSET_SECS: i32 = 7 * 3600;

const WEEK_MS: i64 = 7 * 24 * 3600 * 1000;

/// Bin edges over the confluence fraction. The last bin is open-ended.
const BIN_EDGES: [(f64, Option<f64>); 4] = [
    (0.50, Some(0.60)),
    (0.60, Some(0.70)),
    (0.70, Some(0.80)),
    (0.80, None),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorecardBin {
    pub label: String,
    pub samples: u32,
    pub wins: u32,
    /// Absent when the bin has no samples.
    pub winrate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scorecard {
    /// Week start in unix milliseconds (Monday 00:00 WIB).
    pub week_start: i64,
    pub bins: Vec<ScorecardBin>,
    pub monotonic_ok: bool,
}

pub struct WeeklyScorecard {
    log: Arc<EventLog>,
    notifier: Arc<dyn Notifier>,
    /// Single-flight guard: overlapping generate() calls coalesce.
    running: tokio::sync::Mutex<()>,
}

impl WeeklyScorecard {
    pub fn new(log: Arc<EventLog>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            log,
            notifier,
            running: tokio::sync::Mutex::new(()),
        }
    }

    /// Start of the week containing `at`, in unix milliseconds.
    pub fn week_start_for(at: DateTime<Utc>) -> i64 {
        let wib = FixedOffset::east_opt(WIB_OFFSET_SECS).expect("valid fixed offset");
        let local = at.with_timezone(&wib);
        let monday = local.date_naive()
            - chrono::Days::new(local.weekday().num_days_from_monday() as u64);
        wib.from_local_datetime(&monday.and_hms_opt(0, 0, 0).expect("midnight exists"))
            .single()
            .expect("fixed offsets have no DST gaps")
            .timestamp_millis()
    }

    pub fn current_week_start() -> i64 {
        Self::week_start_for(Utc::now())
    }

    /// Compute, persist, and (on calibration drift) notify for the week
    /// starting at `week_start` (unix ms, Monday 00:00 WIB).
    ///
    /// Returns `None` when another generation is already in flight.
    pub async fn generate(&self, week_start: i64) -> Result<Option<Scorecard>> {
        let Ok(_guard) = self.running.try_lock() else {
            info!("scorecard generation already in flight, coalescing");
            return Ok(None);
        };

        let rows = self
            .log
            .closed_in_window(week_start, week_start + WEEK_MS)
            .context("failed to query closed signals for scorecard")?;

        let scorecard = Self::build(week_start, &rows);

        let bins_json =
            serde_json::to_string(&scorecard.bins).context("failed to serialize bins")?;
        self.log
            .upsert_scorecard(week_start, &bins_json, scorecard.monotonic_ok)
            .context("failed to persist scorecard")?;

        info!(
            week_start,
            samples = rows.len(),
            monotonic_ok = scorecard.monotonic_ok,
            "weekly scorecard generated"
        );

        if !scorecard.monotonic_ok {
            let message = format!(
                "scorecard calibration degraded for week {week_start}: winrates {:?} are not non-decreasing",
                scorecard
                    .bins
                    .iter()
                    .map(|b| b.winrate)
                    .collect::<Vec<_>>()
            );
            // Lock-free send: the single-flight guard only serializes
            // generation, and notification failure is acceptable.
            self.notifier.notify(Severity::High, &message).await;
        }

        Ok(Some(scorecard))
    }

    /// Pure binning + monotonicity check over (confluence, rr_realized) rows.
    fn build(week_start: i64, rows: &[(f64, f64)]) -> Scorecard {
        let bins: Vec<ScorecardBin> = BIN_EDGES
            .iter()
            .map(|&(lo, hi)| {
                let in_bin = |score: f64| match hi {
                    Some(hi) => score >= lo && score < hi,
                    None => score >= lo,
                };
                let members: Vec<&(f64, f64)> =
                    rows.iter().filter(|(score, _)| in_bin(*score)).collect();
                let samples = members.len() as u32;
                let wins = members.iter().filter(|(_, rr)| *rr > 0.0).count() as u32;
                ScorecardBin {
                    label: match hi {
                        Some(hi) => format!("{lo:.2}-{:.2}", hi - 0.01),
                        None => format!(">={lo:.2}"),
                    },
                    samples,
                    wins,
                    winrate: (samples > 0).then(|| wins as f64 / samples as f64),
                }
            })
            .collect();

        // Monotone iff winrates never decrease across populated bins.
        let mut monotonic_ok = true;
        let mut prev: Option<f64> = None;
        for bin in bins.iter() {
            if let Some(rate) = bin.winrate {
                if let Some(p) = prev {
                    if rate < p {
                        monotonic_ok = false;
                        break;
                    }
                }
                prev = Some(rate);
            }
        }

        Scorecard {
            week_start,
            bins,
            monotonic_ok,
        }
    }

    /// Weekly scheduler: sleeps until shortly after each week boundary and
    /// regenerates. Manual `generate` calls coalesce with scheduled runs.
    pub fn spawn_schedule(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let now_ms = Utc::now().timestamp_millis();
                let next_week = Self::current_week_start() + WEEK_MS;
                // A five-minute grace past the boundary lets late closures land.
                let sleep_ms = (next_week - now_ms).max(1_000) + 5 * 60 * 1000;

                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(sleep_ms as u64)) => {
                        let week = Self::current_week_start();
                        if let Err(e) = self.generate(week).await {
                            warn!(error = %e, "scheduled scorecard generation failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("scorecard scheduler stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
