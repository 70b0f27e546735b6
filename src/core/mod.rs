//! Core orchestration logic.
//!
//! This module contains:
//! - EventStore: the per-event typed whiteboard
//! - RandomStreamFactory: reproducible per-event random streams
//! - Stage/ContextDecorator: the per-event capability interfaces
//! - Pipeline: stage registration and validation
//! - Orchestrator: the scheduler and worker pool

pub mod event_store;
pub mod orchestrator;
pub mod pipeline;
pub mod random;
pub mod stage;

// Re-export commonly used types
pub use event_store::{EventStore, EventStoreError};
pub use orchestrator::{Orchestrator, RunError};
pub use pipeline::{ConfigurationError, Pipeline};
pub use random::{RandomStream, RandomStreamFactory};
pub use stage::{
    ContextDecorator, EventAvailability, Severity, Stage, StageDescriptor, StageError, StageKind,
};
