// =============================================================================
// Signal Lifecycle — event log and weekly calibration scorecard
// =============================================================================

pub mod event_log;
pub mod scorecard;

pub use event_log::{
    ClosedEvent, EventLog, InvalidatedEvent, PublishedEvent, Side, SignalEmitter, TriggeredEvent,
};
pub use scorecard::{Scorecard, ScorecardBin, WeeklyScorecard};
