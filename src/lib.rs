// =============================================================================
// Helix Screener — library surface
// =============================================================================
//
// Multi-symbol confluence screening service. The core subsystems:
//
//   screener/    per-symbol pipeline, eight layer scorers, aggregation
//   market_data/ upstream client seam (candles + derivatives)
//   cache        bounded TTL-aware LRU shared by read paths
//   breaker      circuit protection for sub-services
//   admission/   tiered rate limiting, validation, IP blocking
//   alerts/      error-burst accounting and operator notification
//   lifecycle/   signal event log and the weekly calibration scorecard
//   api/         axum REST surface
//
// The binary in main.rs wires these together from environment config.
// =============================================================================

pub mod admission;
pub mod alerts;
pub mod api;
pub mod app_state;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod errors;
pub mod indicators;
pub mod lifecycle;
pub mod market_data;
pub mod screener;
