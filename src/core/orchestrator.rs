//! Pipeline scheduler and worker pool.
//!
//! The orchestrator freezes an immutable run plan at `run()` entry, fans
//! event indices out to a bounded pool of workers through one atomic
//! counter, and walks each event through decorators, readers, algorithms,
//! and writers in fixed order. One event is owned by exactly one worker for
//! its whole lifetime; the only shared mutable state is the dispatch counter
//! and the abort flag.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::domain::{EventState, RunOutcome, RunStatistics, WorkerTally};

use super::event_store::EventStore;
use super::pipeline::{ConfigurationError, Pipeline};
use super::stage::{ContextDecorator, Severity, Stage, StageError};

/// Failure modes of a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The run never started; no worker was dispatched.
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    /// A fatal stage error halted dispatch. Carries the statistics gathered
    /// up to and including the drain.
    #[error("fatal error in stage '{stage}' on event {event}: {source}")]
    Fatal {
        event: u64,
        stage: String,
        statistics: RunStatistics,
        #[source]
        source: anyhow::Error,
    },
}

/// Everything the workers need, fixed for the duration of one run.
struct RunPlan {
    decorators: Vec<Arc<dyn ContextDecorator>>,
    readers: Vec<Arc<dyn Stage>>,
    algorithms: Vec<Arc<dyn Stage>>,
    writers: Vec<Arc<dyn Stage>>,
    critical: Vec<String>,
    total_events: u64,
}

impl RunPlan {
    fn is_critical(&self, name: &str) -> bool {
        self.critical.iter().any(|c| c == name)
    }
}

/// First fatal error seen by any worker; `run()` surfaces it after drain.
struct FatalRecord {
    event: u64,
    stage: String,
    error: StageError,
}

/// Drives a pipeline over a batch of events.
pub struct Orchestrator {
    config: RunConfig,
}

impl Orchestrator {
    /// Create an orchestrator for the given configuration.
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// The configuration this orchestrator runs with.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run the pipeline to completion.
    ///
    /// Fails fast with a `ConfigurationError` before any worker is
    /// dispatched, or surfaces the first fatal stage error once in-flight
    /// events have drained. Recoverable failures only show up in the
    /// returned statistics.
    #[instrument(skip(self, pipeline), fields(run_id = tracing::field::Empty))]
    pub async fn run(&self, pipeline: Pipeline) -> Result<RunStatistics, RunError> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        // Everything below is fixed before the first worker starts.
        let workers = self.config.resolved_workers()?;
        pipeline.validate(self.config.ordered)?;
        let total_events = resolve_event_count(&self.config, &pipeline)?;

        if self.config.track_fpes {
            info!("floating-point exception tracking requested (diagnostic only)");
        }

        info!(
            events = total_events,
            workers,
            seed = self.config.seed,
            "starting run"
        );

        let plan = Arc::new(RunPlan {
            critical: pipeline.critical_stages().map(str::to_string).collect(),
            decorators: pipeline.decorators().to_vec(),
            readers: pipeline.readers().to_vec(),
            algorithms: pipeline.algorithms().to_vec(),
            writers: pipeline.writers().to_vec(),
            total_events,
        });

        let started_at = Utc::now();
        let clock = Instant::now();

        let next_event = Arc::new(AtomicU64::new(0));
        let abort = Arc::new(AtomicBool::new(false));
        let first_fatal: Arc<Mutex<Option<FatalRecord>>> = Arc::new(Mutex::new(None));

        // More workers than events would only idle.
        let pool_size = workers.min(total_events.max(1) as usize);

        let mut pool = JoinSet::new();
        for worker in 0..pool_size {
            let plan = Arc::clone(&plan);
            let next_event = Arc::clone(&next_event);
            let abort = Arc::clone(&abort);
            let first_fatal = Arc::clone(&first_fatal);

            pool.spawn(async move {
                worker_loop(worker, plan, next_event, abort, first_fatal).await
            });
        }

        let mut tally = WorkerTally::default();
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(worker_tally) => tally.merge(worker_tally),
                Err(err) => error!(%err, "worker task panicked"),
            }
        }

        let aborted = abort.load(Ordering::SeqCst);
        let mut failed_events = tally.failed_events;
        failed_events.sort_unstable();

        let finished_at = Utc::now();
        let statistics = RunStatistics {
            run_id,
            outcome: if aborted {
                RunOutcome::Aborted
            } else {
                RunOutcome::Finished
            },
            events_planned: total_events,
            events_attempted: tally.attempted,
            events_succeeded: tally.succeeded,
            events_failed: failed_events.len() as u64,
            failed_events,
            failures_by_stage: tally.failures_by_stage,
            recoverable_errors: tally.recoverable_errors,
            fatal_errors: tally.fatal_errors,
            started_at,
            finished_at,
            wall_time_ms: clock.elapsed().as_millis() as u64,
        };

        info!(
            attempted = statistics.events_attempted,
            succeeded = statistics.events_succeeded,
            failed = statistics.events_failed,
            wall_time_ms = statistics.wall_time_ms,
            "run complete"
        );

        if let Some(dir) = &self.config.output_dir {
            // Best effort: a failed summary write never fails the run.
            if let Err(err) = write_summary(dir, &statistics).await {
                warn!(%err, "failed to write run summary");
            }
        }

        let fatal = first_fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(record) = fatal {
            return Err(RunError::Fatal {
                event: record.event,
                stage: record.stage,
                statistics,
                source: record.error.into_source(),
            });
        }

        Ok(statistics)
    }
}

/// Total event count: min of the explicit config and the smallest bounded
/// reader, whichever sources exist.
fn resolve_event_count(
    config: &RunConfig,
    pipeline: &Pipeline,
) -> Result<u64, ConfigurationError> {
    match (config.events, pipeline.min_reader_events()) {
        (Some(explicit), Some(from_readers)) => Ok(explicit.min(from_readers)),
        (Some(explicit), None) => Ok(explicit),
        (None, Some(from_readers)) => Ok(from_readers),
        (None, None) => Err(ConfigurationError::NoEventCountSource),
    }
}

/// One worker: pull indices off the shared counter until the batch is
/// exhausted or an abort is requested.
///
/// Each event runs in its own task so a panicking stage fails that event
/// (fatally) instead of taking the worker and its tally down with it.
async fn worker_loop(
    worker: usize,
    plan: Arc<RunPlan>,
    next_event: Arc<AtomicU64>,
    abort: Arc<AtomicBool>,
    first_fatal: Arc<Mutex<Option<FatalRecord>>>,
) -> WorkerTally {
    let mut tally = WorkerTally::default();

    loop {
        if abort.load(Ordering::SeqCst) {
            break;
        }

        let event = next_event.fetch_add(1, Ordering::SeqCst);
        if event >= plan.total_events {
            break;
        }

        let current_stage = Arc::new(Mutex::new(String::new()));
        let handle = tokio::spawn(process_event(
            Arc::clone(&plan),
            event,
            worker,
            Arc::clone(&current_stage),
        ));

        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                let stage = current_stage
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                let message = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    join_err.to_string()
                };
                Err((
                    stage,
                    StageError::fatal(anyhow::anyhow!("stage panicked: {message}")),
                ))
            }
        };

        match result {
            Ok(()) => tally.record_success(),
            Err((stage, error)) => {
                let fatal = error.severity() == Severity::Fatal;
                warn!(event, %stage, %error, fatal, "event failed");
                tally.record_failure(event, &stage, fatal);

                if fatal {
                    abort.store(true, Ordering::SeqCst);
                    first_fatal
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .get_or_insert(FatalRecord {
                            event,
                            stage,
                            error,
                        });
                }
            }
        }
    }

    tally
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string payload".to_string()
    }
}

/// Walk one event through decorators and the three stage classes, in fixed
/// order, against a fresh whiteboard. Returns the failing stage's name on
/// error; the whiteboard is dropped either way. `current_stage` mirrors the
/// stage being run so the worker can attribute a panic.
async fn process_event(
    plan: Arc<RunPlan>,
    event: u64,
    worker: usize,
    current_stage: Arc<Mutex<String>>,
) -> Result<(), (String, StageError)> {
    let mut store = EventStore::new(event);
    let mut state = EventState::Decorating;

    for decorator in &plan.decorators {
        tracing::trace!(event, worker, %state, decorator = decorator.name(), "running");
        set_current(&current_stage, decorator.name());
        decorator
            .decorate(event, &mut store)
            .await
            .map_err(|e| classify(&plan, decorator.name(), e))?;
    }

    for (phase, stages) in [
        (EventState::Reading, &plan.readers),
        (EventState::Processing, &plan.algorithms),
        (EventState::Writing, &plan.writers),
    ] {
        state = phase;
        for stage in stages {
            tracing::trace!(event, worker, %state, stage = stage.name(), "running");
            set_current(&current_stage, stage.name());
            stage
                .process(event, &mut store)
                .await
                .map_err(|e| classify(&plan, stage.name(), e))?;
        }
    }

    state = EventState::Done;
    debug!(event, worker, %state, keys = store.len(), "event done");
    Ok(())
}

fn set_current(slot: &Mutex<String>, name: &str) {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    guard.clear();
    guard.push_str(name);
}

/// Apply the critical-stage escalation policy.
fn classify(plan: &RunPlan, stage: &str, error: StageError) -> (String, StageError) {
    let error = if plan.is_critical(stage) && error.severity() == Severity::Recoverable {
        error.escalate()
    } else {
        error
    };
    (stage.to_string(), error)
}

/// Persist the run summary as pretty JSON under the output directory.
async fn write_summary(dir: &std::path::Path, statistics: &RunStatistics) -> anyhow::Result<()> {
    use anyhow::Context;

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let path = dir.join("run_summary.json");
    let json = serde_json::to_string_pretty(statistics).context("Failed to serialize summary")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write run summary: {}", path.display()))?;

    debug!(path = %path.display(), "run summary written");
    Ok(())
}
