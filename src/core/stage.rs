//! Stage and decorator capabilities.
//!
//! All three stage kinds share one interface and differ only in their
//! ordering class; the orchestrator dispatches through the trait and never
//! inspects concrete types. Declared input/output keys are advisory
//! documentation: conflicts surface at run time through the whiteboard
//! invariants, not at registration.

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::event_store::{EventStore, EventStoreError};

/// Ordering class of a stage within one event.
///
/// Readers run before algorithms, algorithms before writers. Within a class,
/// registration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Populates new keys from an external source; may bound the event count.
    Reader,

    /// Reads and writes keys; touches nothing outside its own event.
    Algorithm,

    /// Reads keys and performs an external side effect; writes no keys.
    Writer,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Reader => "reader",
            Self::Algorithm => "algorithm",
            Self::Writer => "writer",
        };
        f.write_str(s)
    }
}

/// How many events a reader can supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAvailability {
    /// The reader knows its event count up front.
    Bounded(u64),

    /// The reader supplies an unordered subset of indices with no count.
    /// Only admitted when ordered mode is disabled.
    Streaming,
}

/// Immutable registration record for a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// Stage name, unique across the pipeline.
    pub name: String,

    /// Ordering class.
    pub kind: StageKind,

    /// Advisory whiteboard keys this stage reads.
    pub inputs: Vec<String>,

    /// Advisory whiteboard keys this stage writes.
    pub outputs: Vec<String>,
}

/// A per-event unit of work over the whiteboard.
///
/// Implementations must not touch any event other than the one passed in;
/// writers with ordering-sensitive external state must serialize internally.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name, unique across the pipeline.
    fn name(&self) -> &str;

    /// Ordering class; must agree with how the stage is registered.
    fn kind(&self) -> StageKind;

    /// Advisory input keys.
    fn inputs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Advisory output keys.
    fn outputs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Event availability. Only meaningful for readers; `None` means this
    /// stage is no event-count source.
    fn available_events(&self) -> Option<EventAvailability> {
        None
    }

    /// Process one event against its whiteboard.
    async fn process(&self, event: u64, store: &mut EventStore) -> Result<(), StageError>;
}

/// A per-event setup step run before every stage of that event.
///
/// Decorators may write whiteboard keys (an alignment context, say) but must
/// not read keys produced by later stages.
#[async_trait]
pub trait ContextDecorator: Send + Sync {
    /// Decorator name, unique across the pipeline.
    fn name(&self) -> &str;

    /// Attach per-event context to the whiteboard.
    async fn decorate(&self, event: u64, store: &mut EventStore) -> Result<(), StageError>;
}

/// How a stage failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The event is marked failed; the run continues.
    Recoverable,

    /// The event is marked failed and no new events are dispatched;
    /// in-flight events drain.
    Fatal,
}

/// A failure from a reader, algorithm, writer, or decorator.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct StageError {
    severity: Severity,
    #[source]
    source: anyhow::Error,
}

impl StageError {
    /// A failure that spoils only the current event.
    pub fn recoverable(source: impl Into<anyhow::Error>) -> Self {
        Self {
            severity: Severity::Recoverable,
            source: source.into(),
        }
    }

    /// A failure that must halt dispatch of new events.
    pub fn fatal(source: impl Into<anyhow::Error>) -> Self {
        Self {
            severity: Severity::Fatal,
            source: source.into(),
        }
    }

    /// A recoverable failure from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::recoverable(anyhow!(message.into()))
    }

    /// The failure's severity.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Escalate to fatal, keeping the underlying error. Used by the
    /// orchestrator for stages marked critical.
    pub fn escalate(mut self) -> Self {
        self.severity = Severity::Fatal;
        self
    }

    /// The underlying error.
    pub fn source_error(&self) -> &anyhow::Error {
        &self.source
    }

    /// Consume the error, yielding the underlying cause.
    pub fn into_source(self) -> anyhow::Error {
        self.source
    }
}

/// Whiteboard violations default to recoverable; the orchestrator escalates
/// them when the failing stage is marked critical.
impl From<EventStoreError> for StageError {
    fn from(err: EventStoreError) -> Self {
        Self::recoverable(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_defaults_recoverable() {
        let err: StageError = EventStoreError::MissingKey {
            event: 4,
            key: "tracks".to_string(),
        }
        .into();

        assert_eq!(err.severity(), Severity::Recoverable);
        assert!(err.to_string().contains("tracks"));
    }

    #[test]
    fn test_escalate_keeps_cause() {
        let err = StageError::msg("sink unavailable").escalate();
        assert_eq!(err.severity(), Severity::Fatal);
        assert_eq!(err.to_string(), "sink unavailable");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(StageKind::Reader.to_string(), "reader");
        assert_eq!(StageKind::Algorithm.to_string(), "algorithm");
        assert_eq!(StageKind::Writer.to_string(), "writer");
    }
}
