//! conductor - deterministic batch event-pipeline engine
//!
//! An orchestration engine that drives a batch of independent "event"
//! computations through a fixed pipeline of stages (readers, algorithms,
//! writers) with reproducible numeric results under multi-threaded
//! execution.
//!
//! # Architecture
//!
//! - Events are independent units of work identified by an index in
//!   `[0, N)`; each owns a typed whiteboard (`EventStore`) and reproducible
//!   random streams for its processing lifetime.
//! - Stages share one capability interface tagged with an ordering class
//!   (Reader < Algorithm < Writer); context decorators run before any stage
//!   of an event.
//! - The orchestrator fans events out to a bounded worker pool through an
//!   atomic dispatch counter; random streams derive purely from
//!   (seed, event, purpose), so results never depend on scheduling.
//!
//! # Modules
//!
//! - `core`: EventStore, random streams, stage traits, Pipeline, Orchestrator
//! - `domain`: run statistics and lifecycle states
//! - `config`: run configuration
//! - `cli`: command-line interface and the built-in demo pipeline
//!
//! # Usage
//!
//! ```bash
//! # Run the demo pipeline over 100 events on 4 workers
//! conductor run --events 100 --threads 4 --seed 7
//!
//! # Show the resolved configuration
//! conductor config
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use config::RunConfig;
pub use core::{
    ConfigurationError, ContextDecorator, EventAvailability, EventStore, EventStoreError,
    Orchestrator, Pipeline, RandomStream, RandomStreamFactory, RunError, Severity, Stage,
    StageDescriptor, StageError, StageKind,
};
pub use domain::{EventState, RunOutcome, RunStatistics};
