//! Domain types for the conductor engine.
//!
//! This module contains the run-level data structures:
//! - EventState: per-event lifecycle
//! - RunOutcome / RunStatistics: how a run ended and what it counted

pub mod stats;

// Re-export commonly used types
pub use stats::{EventState, RunOutcome, RunStatistics};

pub(crate) use stats::WorkerTally;
