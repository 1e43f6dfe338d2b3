// =============================================================================
// Signal Event Log — append-only lifecycle tables over SQLite
// =============================================================================
//
// Four append-only tables keyed by signal_id:
//
//   signals              published signals (idempotent insert)
//   signal_triggers      entry fills
//   signal_invalidations signals that never filled
//   signal_closures      exits (require a prior trigger)
//
// Lifecycle invariants enforced on insert:
//   - a signal has at most one of trigger OR invalidation, never both
//   - a closure requires an existing trigger
//   - ts_published <= ts_triggered <= ts_closed
//
// The emitter wrapper at the bottom is what request paths consume: with the
// feature flag off or no database configured it silently no-ops, and any
// database failure is logged and swallowed. Observability must never break
// a request.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Schema. WAL mode keeps concurrent readers cheap during inserts.
const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS signals (
    signal_id        TEXT PRIMARY KEY,
    symbol           TEXT NOT NULL,
    side             TEXT NOT NULL CHECK (side IN ('long', 'short')),
    confluence_score REAL NOT NULL,
    rr_target        REAL NOT NULL,
    expiry_minutes   INTEGER NOT NULL,
    rules_version    TEXT NOT NULL,
    ts_published     INTEGER NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS signal_triggers (
    signal_id          TEXT PRIMARY KEY,
    ts_triggered       INTEGER NOT NULL,
    entry_fill         REAL NOT NULL,
    time_to_trigger_ms INTEGER NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS signal_invalidations (
    signal_id      TEXT PRIMARY KEY,
    ts_invalidated INTEGER NOT NULL,
    reason         TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS signal_closures (
    signal_id        TEXT PRIMARY KEY,
    ts_closed        INTEGER NOT NULL,
    rr_realized      REAL NOT NULL,
    time_in_trade_ms INTEGER NOT NULL,
    exit_reason      TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS weekly_scorecard (
    week_start   INTEGER PRIMARY KEY,
    bins         TEXT NOT NULL,
    monotonic_ok INTEGER NOT NULL,
    created_at   INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_signals_published ON signals(ts_published);
"#;

// =============================================================================
// Event shapes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub signal_id: String,
    pub symbol: String,
    pub side: Side,
    /// Confluence score as a fraction in [0, 1].
    pub confluence_score: f64,
    pub rr_target: f64,
    pub expiry_minutes: i64,
    pub rules_version: String,
    pub ts_published: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredEvent {
    pub signal_id: String,
    pub ts_triggered: i64,
    pub entry_fill: f64,
    pub time_to_trigger_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidatedEvent {
    pub signal_id: String,
    pub ts_invalidated: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedEvent {
    pub signal_id: String,
    pub ts_closed: i64,
    pub rr_realized: f64,
    pub time_in_trade_ms: i64,
    pub exit_reason: String,
}

// =============================================================================
// EventLog
// =============================================================================

pub struct EventLog {
    conn: Mutex<Connection>,
}

impl EventLog {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open event log database at {path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to apply event log schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to apply event log schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a published signal. Idempotent on `signal_id`: a duplicate is
    /// a no-op and returns `false`.
    pub fn insert_published(&self, event: &PublishedEvent) -> Result<bool> {
        validate_signal_id(&event.signal_id)?;
        if !(0.0..=1.0).contains(&event.confluence_score) {
            anyhow::bail!(
                "confluence_score {} outside [0, 1]",
                event.confluence_score
            );
        }
        if event.symbol.is_empty() || event.rules_version.is_empty() {
            anyhow::bail!("symbol and rules_version must be non-empty");
        }

        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO signals
               (signal_id, symbol, side, confluence_score, rr_target,
                expiry_minutes, rules_version, ts_published)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.signal_id,
                event.symbol,
                event.side.as_str(),
                event.confluence_score,
                event.rr_target,
                event.expiry_minutes,
                event.rules_version,
                event.ts_published,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Record an entry fill. Rejected when the signal is unknown, already
    /// invalidated, already triggered, or out of timestamp order.
    pub fn insert_triggered(&self, event: &TriggeredEvent) -> Result<()> {
        validate_signal_id(&event.signal_id)?;
        let conn = self.conn.lock();

        let ts_published = published_ts(&conn, &event.signal_id)?;
        if event.ts_triggered < ts_published {
            anyhow::bail!("ts_triggered precedes ts_published");
        }
        if exists(&conn, "signal_invalidations", &event.signal_id)? {
            anyhow::bail!("signal {} was already invalidated", event.signal_id);
        }
        if exists(&conn, "signal_triggers", &event.signal_id)? {
            anyhow::bail!("signal {} was already triggered", event.signal_id);
        }

        conn.execute(
            "INSERT INTO signal_triggers
               (signal_id, ts_triggered, entry_fill, time_to_trigger_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.signal_id,
                event.ts_triggered,
                event.entry_fill,
                event.time_to_trigger_ms,
            ],
        )?;
        Ok(())
    }

    /// Record an invalidation. Rejected when the signal is unknown, already
    /// triggered, or already invalidated.
    pub fn insert_invalidated(&self, event: &InvalidatedEvent) -> Result<()> {
        validate_signal_id(&event.signal_id)?;
        let conn = self.conn.lock();

        published_ts(&conn, &event.signal_id)?;
        if exists(&conn, "signal_triggers", &event.signal_id)? {
            anyhow::bail!("signal {} was already triggered", event.signal_id);
        }
        if exists(&conn, "signal_invalidations", &event.signal_id)? {
            anyhow::bail!("signal {} was already invalidated", event.signal_id);
        }

        conn.execute(
            "INSERT INTO signal_invalidations (signal_id, ts_invalidated, reason)
             VALUES (?1, ?2, ?3)",
            params![event.signal_id, event.ts_invalidated, event.reason],
        )?;
        Ok(())
    }

    /// Record an exit. Requires an existing trigger and ordered timestamps.
    pub fn insert_closed(&self, event: &ClosedEvent) -> Result<()> {
        validate_signal_id(&event.signal_id)?;
        let conn = self.conn.lock();

        let ts_triggered: i64 = conn
            .query_row(
                "SELECT ts_triggered FROM signal_triggers WHERE signal_id = ?1",
                params![event.signal_id],
                |row| row.get(0),
            )
            .optional()?
            .with_context(|| format!("signal {} has no trigger to close", event.signal_id))?;

        if event.ts_closed < ts_triggered {
            anyhow::bail!("ts_closed precedes ts_triggered");
        }
        if exists(&conn, "signal_closures", &event.signal_id)? {
            anyhow::bail!("signal {} was already closed", event.signal_id);
        }

        conn.execute(
            "INSERT INTO signal_closures
               (signal_id, ts_closed, rr_realized, time_in_trade_ms, exit_reason)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.signal_id,
                event.ts_closed,
                event.rr_realized,
                event.time_in_trade_ms,
                event.exit_reason,
            ],
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Scorecard queries
    // -------------------------------------------------------------------------

    /// `(confluence_score, rr_realized)` for every closed signal published
    /// inside `[start_ms, end_ms)`. The only place lifecycle tables are
    /// joined.
    pub fn closed_in_window(&self, start_ms: i64, end_ms: i64) -> Result<Vec<(f64, f64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT s.confluence_score, c.rr_realized
               FROM signals s
               JOIN signal_closures c ON c.signal_id = s.signal_id
              WHERE s.ts_published >= ?1 AND s.ts_published < ?2",
        )?;
        let rows = stmt
            .query_map(params![start_ms, end_ms], |row| {
                Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn upsert_scorecard(
        &self,
        week_start: i64,
        bins_json: &str,
        monotonic_ok: bool,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO weekly_scorecard (week_start, bins, monotonic_ok, created_at)
             VALUES (?1, ?2, ?3, strftime('%s', 'now'))
             ON CONFLICT(week_start) DO UPDATE SET
               bins = excluded.bins,
               monotonic_ok = excluded.monotonic_ok,
               created_at = excluded.created_at",
            params![week_start, bins_json, monotonic_ok as i64],
        )?;
        Ok(())
    }

    pub fn get_scorecard(&self, week_start: i64) -> Result<Option<(String, bool)>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT bins, monotonic_ok FROM weekly_scorecard WHERE week_start = ?1",
                params![week_start],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .optional()?;
        Ok(row)
    }
}

fn validate_signal_id(signal_id: &str) -> Result<()> {
    if signal_id.is_empty() || signal_id.len() > 64 {
        anyhow::bail!("signal_id must be 1..=64 characters");
    }
    Ok(())
}

fn published_ts(conn: &Connection, signal_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT ts_published FROM signals WHERE signal_id = ?1",
        params![signal_id],
        |row| row.get(0),
    )
    .optional()?
    .with_context(|| format!("unknown signal {signal_id}"))
}

fn exists(conn: &Connection, table: &str, signal_id: &str) -> Result<bool> {
    // Table names come from a fixed internal set, never from input.
    let sql = format!("SELECT 1 FROM {table} WHERE signal_id = ?1");
    Ok(conn
        .query_row(&sql, params![signal_id], |_| Ok(()))
        .optional()?
        .is_some())
}

// =============================================================================
// SignalEmitter — the façade request paths actually call
// =============================================================================

/// Fire-and-forget lifecycle emission. With the feature flag off or no
/// database configured, every call is a silent no-op; failures are logged
/// and never propagated.
#[derive(Clone)]
pub struct SignalEmitter {
    log: Option<Arc<EventLog>>,
    enabled: bool,
}

impl SignalEmitter {
    pub fn new(log: Option<Arc<EventLog>>, enabled: bool) -> Self {
        Self { log, enabled }
    }

    pub fn disabled() -> Self {
        Self {
            log: None,
            enabled: false,
        }
    }

    fn active_log(&self) -> Option<&Arc<EventLog>> {
        if !self.enabled {
            return None;
        }
        self.log.as_ref()
    }

    pub fn publish(&self, event: PublishedEvent) {
        let Some(log) = self.active_log() else { return };
        match log.insert_published(&event) {
            Ok(true) => debug!(signal_id = %event.signal_id, "signal published"),
            Ok(false) => debug!(signal_id = %event.signal_id, "duplicate publish ignored"),
            Err(e) => warn!(signal_id = %event.signal_id, error = %e, "publish emission dropped"),
        }
    }

    pub fn triggered(&self, event: TriggeredEvent) {
        let Some(log) = self.active_log() else { return };
        if let Err(e) = log.insert_triggered(&event) {
            warn!(signal_id = %event.signal_id, error = %e, "trigger emission dropped");
        }
    }

    pub fn invalidated(&self, event: InvalidatedEvent) {
        let Some(log) = self.active_log() else { return };
        if let Err(e) = log.insert_invalidated(&event) {
            warn!(signal_id = %event.signal_id, error = %e, "invalidation emission dropped");
        }
    }

    pub fn closed(&self, event: ClosedEvent) {
        let Some(log) = self.active_log() else { return };
        if let Err(e) = log.insert_closed(&event) {
            warn!(signal_id = %event.signal_id, error = %e, "closure emission dropped");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn published(id: &str, score: f64) -> PublishedEvent {
        PublishedEvent {
            signal_id: id.to_string(),
            symbol: "BTC-USDT-SWAP".to_string(),
            side: Side::Long,
            confluence_score: score,
            rr_target: 2.0,
            expiry_minutes: 240,
            rules_version: "v3".to_string(),
            ts_published: 1_000,
        }
    }

    fn triggered(id: &str, ts: i64) -> TriggeredEvent {
        TriggeredEvent {
            signal_id: id.to_string(),
            ts_triggered: ts,
            entry_fill: 100.0,
            time_to_trigger_ms: ts - 1_000,
        }
    }

    fn closed(id: &str, ts: i64, rr: f64) -> ClosedEvent {
        ClosedEvent {
            signal_id: id.to_string(),
            ts_closed: ts,
            rr_realized: rr,
            time_in_trade_ms: 60_000,
            exit_reason: "tp1".to_string(),
        }
    }

    #[test]
    fn publish_is_idempotent() {
        let log = EventLog::open_in_memory().unwrap();
        assert!(log.insert_published(&published("sig-1", 0.7)).unwrap());
        assert!(!log.insert_published(&published("sig-1", 0.9)).unwrap());

        // Second publish changed nothing.
        let rows = {
            log.insert_triggered(&triggered("sig-1", 2_000)).unwrap();
            log.insert_closed(&closed("sig-1", 3_000, 1.5)).unwrap();
            log.closed_in_window(0, 10_000).unwrap()
        };
        assert_eq!(rows, vec![(0.7, 1.5)]);
    }

    #[test]
    fn publish_rejects_bad_shapes() {
        let log = EventLog::open_in_memory().unwrap();
        assert!(log.insert_published(&published("", 0.7)).is_err());
        assert!(log.insert_published(&published("sig-1", 1.5)).is_err());

        let mut no_symbol = published("sig-2", 0.7);
        no_symbol.symbol = String::new();
        assert!(log.insert_published(&no_symbol).is_err());
    }

    #[test]
    fn trigger_and_invalidation_are_mutually_exclusive() {
        let log = EventLog::open_in_memory().unwrap();
        log.insert_published(&published("sig-1", 0.7)).unwrap();
        log.insert_published(&published("sig-2", 0.7)).unwrap();

        log.insert_triggered(&triggered("sig-1", 2_000)).unwrap();
        assert!(log
            .insert_invalidated(&InvalidatedEvent {
                signal_id: "sig-1".to_string(),
                ts_invalidated: 2_500,
                reason: "expired".to_string(),
            })
            .is_err());

        log.insert_invalidated(&InvalidatedEvent {
            signal_id: "sig-2".to_string(),
            ts_invalidated: 2_500,
            reason: "expired".to_string(),
        })
        .unwrap();
        assert!(log.insert_triggered(&triggered("sig-2", 3_000)).is_err());
    }

    #[test]
    fn closure_requires_a_trigger() {
        let log = EventLog::open_in_memory().unwrap();
        log.insert_published(&published("sig-1", 0.7)).unwrap();
        assert!(log.insert_closed(&closed("sig-1", 3_000, 1.0)).is_err());

        log.insert_triggered(&triggered("sig-1", 2_000)).unwrap();
        log.insert_closed(&closed("sig-1", 3_000, 1.0)).unwrap();
    }

    #[test]
    fn timestamps_must_be_ordered() {
        let log = EventLog::open_in_memory().unwrap();
        log.insert_published(&published("sig-1", 0.7)).unwrap();

        // Trigger before publish: rejected.
        assert!(log.insert_triggered(&triggered("sig-1", 500)).is_err());

        log.insert_triggered(&triggered("sig-1", 2_000)).unwrap();
        // Close before trigger: rejected.
        assert!(log.insert_closed(&closed("sig-1", 1_500, 1.0)).is_err());
    }

    #[test]
    fn unknown_signal_is_rejected() {
        let log = EventLog::open_in_memory().unwrap();
        assert!(log.insert_triggered(&triggered("ghost", 2_000)).is_err());
        assert!(log
            .insert_invalidated(&InvalidatedEvent {
                signal_id: "ghost".to_string(),
                ts_invalidated: 2_000,
                reason: "expired".to_string(),
            })
            .is_err());
    }

    #[test]
    fn window_query_filters_on_publish_time() {
        let log = EventLog::open_in_memory().unwrap();

        let mut early = published("early", 0.6);
        early.ts_published = 1_000;
        let mut late = published("late", 0.8);
        late.ts_published = 50_000;

        log.insert_published(&early).unwrap();
        log.insert_published(&late).unwrap();
        log.insert_triggered(&triggered("early", 2_000)).unwrap();
        log.insert_closed(&closed("early", 3_000, 1.0)).unwrap();
        log.insert_triggered(&TriggeredEvent {
            signal_id: "late".to_string(),
            ts_triggered: 51_000,
            entry_fill: 10.0,
            time_to_trigger_ms: 1_000,
        })
        .unwrap();
        log.insert_closed(&closed("late", 52_000, -0.5)).unwrap();

        let window = log.closed_in_window(0, 10_000).unwrap();
        assert_eq!(window, vec![(0.6, 1.0)]);
    }

    #[test]
    fn emitter_never_propagates_failures() {
        // Disabled emitter: everything is a no-op.
        let emitter = SignalEmitter::disabled();
        emitter.publish(published("sig-1", 0.7));
        emitter.triggered(triggered("sig-1", 2_000));

        // Enabled emitter absorbs constraint violations.
        let log = Arc::new(EventLog::open_in_memory().unwrap());
        let emitter = SignalEmitter::new(Some(log.clone()), true);
        emitter.triggered(triggered("ghost", 2_000)); // unknown signal, dropped
        emitter.publish(published("sig-1", 0.7));
        emitter.publish(published("sig-1", 0.7)); // duplicate, dropped

        let rows = log.closed_in_window(0, 10_000).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn scorecard_upsert_overwrites() {
        let log = EventLog::open_in_memory().unwrap();
        log.upsert_scorecard(1_000, r#"[{"v":1}]"#, true).unwrap();
        log.upsert_scorecard(1_000, r#"[{"v":2}]"#, false).unwrap();

        let (bins, ok) = log.get_scorecard(1_000).unwrap().unwrap();
        assert_eq!(bins, r#"[{"v":2}]"#);
        assert!(!ok);
        assert!(log.get_scorecard(2_000).unwrap().is_none());
    }
}
