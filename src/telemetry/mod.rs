//! Telemetry module for logging, metrics and diagnostics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Counters for ingest and delivery
//! - The diagnostic side channel of the ingest loop

mod diagnostics;
mod logging;
mod metrics;

pub use diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
pub use logging::{LogConfig, init_logging, is_known_level};
pub use metrics::{Counter, EngineStats, StreamStats};
