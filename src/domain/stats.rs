//! Run statistics and lifecycle states.
//!
//! The orchestrator is the only writer of `RunStatistics`; once `run()`
//! returns, the record is read-only. It serializes cleanly so a run summary
//! can be persisted next to the pipeline's own artifacts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one event inside the scheduler.
///
/// `Failed` is terminal and reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    /// Not yet picked up by a worker.
    Pending,

    /// Context decorators are running.
    Decorating,

    /// Readers are running.
    Reading,

    /// Algorithms are running.
    Processing,

    /// Writers are running.
    Writing,

    /// All stages completed.
    Done,

    /// A decorator or stage failed.
    Failed,
}

impl EventState {
    /// Whether the event has left the pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Decorating => "decorating",
            Self::Reading => "reading",
            Self::Processing => "processing",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every planned event was dispatched.
    Finished,

    /// A fatal error halted dispatch; in-flight events drained.
    Aborted,
}

/// Aggregate counters and timing for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Identifier of this run, carried in logs and the summary file.
    pub run_id: Uuid,

    /// How the run ended.
    pub outcome: RunOutcome,

    /// Events the run intended to process.
    pub events_planned: u64,

    /// Events that reached a terminal state (`Done` or `Failed`).
    pub events_attempted: u64,

    /// Events that reached `Done`.
    pub events_succeeded: u64,

    /// Events that ended `Failed`.
    pub events_failed: u64,

    /// Indices of failed events, ascending.
    pub failed_events: Vec<u64>,

    /// Failure count per stage or decorator name.
    pub failures_by_stage: HashMap<String, u64>,

    /// Recoverable stage errors observed.
    pub recoverable_errors: u64,

    /// Fatal stage errors observed.
    pub fatal_errors: u64,

    /// When the run started (UTC).
    pub started_at: DateTime<Utc>,

    /// When the run finished (UTC).
    pub finished_at: DateTime<Utc>,

    /// Wall time of the whole run in milliseconds.
    pub wall_time_ms: u64,
}

impl RunStatistics {
    /// Whether every attempted event succeeded and dispatch never aborted.
    pub fn is_clean(&self) -> bool {
        self.outcome == RunOutcome::Finished && self.events_failed == 0
    }

    /// Processed events per wall-clock second.
    pub fn events_per_second(&self) -> f64 {
        if self.wall_time_ms == 0 {
            return 0.0;
        }
        self.events_attempted as f64 * 1000.0 / self.wall_time_ms as f64
    }
}

/// Per-worker tally merged into `RunStatistics` after the pool drains.
#[derive(Debug, Default)]
pub(crate) struct WorkerTally {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed_events: Vec<u64>,
    pub failures_by_stage: HashMap<String, u64>,
    pub recoverable_errors: u64,
    pub fatal_errors: u64,
}

impl WorkerTally {
    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, event: u64, stage: &str, fatal: bool) {
        self.attempted += 1;
        self.failed_events.push(event);
        *self.failures_by_stage.entry(stage.to_string()).or_insert(0) += 1;
        if fatal {
            self.fatal_errors += 1;
        } else {
            self.recoverable_errors += 1;
        }
    }

    pub fn merge(&mut self, other: WorkerTally) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed_events.extend(other.failed_events);
        for (stage, count) in other.failures_by_stage {
            *self.failures_by_stage.entry(stage).or_insert(0) += count;
        }
        self.recoverable_errors += other.recoverable_errors;
        self.fatal_errors += other.fatal_errors;
    }
}
