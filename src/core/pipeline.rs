//! Pipeline assembly.
//!
//! A `Pipeline` is the append-only registration surface a client fills
//! before handing it to the orchestrator: decorators, then stages grouped by
//! ordering class. Registration checks structural problems only (kind
//! agreement, duplicate names); data-key conflicts are left to the
//! whiteboard invariants at run time.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use super::stage::{ContextDecorator, EventAvailability, Stage, StageDescriptor, StageKind};

/// Pre-run configuration and registration errors. All of these abort before
/// any worker is dispatched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A stage was registered under a different ordering class than it
    /// declares.
    #[error("stage '{name}' declares kind {declared} but was registered as {registered}")]
    KindMismatch {
        name: String,
        declared: StageKind,
        registered: StageKind,
    },

    /// Two stages or decorators share a name.
    #[error("duplicate stage name '{name}'")]
    DuplicateName { name: String },

    /// Neither an explicit event count nor a bounded reader is available.
    #[error("no event count source: set an explicit event count or add a bounded reader")]
    NoEventCountSource,

    /// Worker count was neither positive nor -1.
    #[error("invalid thread count {threads}: expected a positive count or -1 for auto")]
    InvalidThreadCount { threads: i64 },

    /// A streaming reader was registered while ordered mode is enabled.
    #[error("streaming reader '{name}' requires ordered mode to be disabled")]
    StreamingReaderOrdered { name: String },

    /// `mark_critical` named a stage that was never registered.
    #[error("cannot mark unknown stage '{name}' critical")]
    UnknownStage { name: String },
}

/// An ordered, append-only set of decorators and stages.
#[derive(Default)]
pub struct Pipeline {
    decorators: Vec<Arc<dyn ContextDecorator>>,
    readers: Vec<Arc<dyn Stage>>,
    algorithms: Vec<Arc<dyn Stage>>,
    writers: Vec<Arc<dyn Stage>>,
    critical: HashSet<String>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a context decorator. Decorators run for every event, in
    /// registration order, before any stage of that event.
    pub fn add_context_decorator(
        &mut self,
        decorator: Arc<dyn ContextDecorator>,
    ) -> Result<(), ConfigurationError> {
        let name = decorator.name().to_string();
        self.check_fresh_name(&name)?;
        self.decorators.push(decorator);
        Ok(())
    }

    /// Append a reader.
    pub fn add_reader(&mut self, stage: Arc<dyn Stage>) -> Result<(), ConfigurationError> {
        self.add_stage(stage, StageKind::Reader)
    }

    /// Append an algorithm.
    pub fn add_algorithm(&mut self, stage: Arc<dyn Stage>) -> Result<(), ConfigurationError> {
        self.add_stage(stage, StageKind::Algorithm)
    }

    /// Append a writer.
    pub fn add_writer(&mut self, stage: Arc<dyn Stage>) -> Result<(), ConfigurationError> {
        self.add_stage(stage, StageKind::Writer)
    }

    /// Escalate the named stage's recoverable failures (including whiteboard
    /// violations) to fatal.
    pub fn mark_critical(&mut self, name: &str) -> Result<(), ConfigurationError> {
        let known = self
            .stages()
            .any(|s| s.name() == name)
            || self.decorators.iter().any(|d| d.name() == name);
        if !known {
            return Err(ConfigurationError::UnknownStage {
                name: name.to_string(),
            });
        }
        self.critical.insert(name.to_string());
        Ok(())
    }

    /// Whether the named stage was marked critical.
    pub fn is_critical(&self, name: &str) -> bool {
        self.critical.contains(name)
    }

    /// Names of all stages marked critical, in arbitrary order.
    pub fn critical_stages(&self) -> impl Iterator<Item = &str> {
        self.critical.iter().map(String::as_str)
    }

    /// Registered decorators, in execution order.
    pub fn decorators(&self) -> &[Arc<dyn ContextDecorator>] {
        &self.decorators
    }

    /// Registered readers, in execution order.
    pub fn readers(&self) -> &[Arc<dyn Stage>] {
        &self.readers
    }

    /// Registered algorithms, in execution order.
    pub fn algorithms(&self) -> &[Arc<dyn Stage>] {
        &self.algorithms
    }

    /// Registered writers, in execution order.
    pub fn writers(&self) -> &[Arc<dyn Stage>] {
        &self.writers
    }

    /// All stages in per-event execution order (readers, algorithms,
    /// writers).
    pub fn stages(&self) -> impl Iterator<Item = &Arc<dyn Stage>> {
        self.readers
            .iter()
            .chain(self.algorithms.iter())
            .chain(self.writers.iter())
    }

    /// Descriptors for every registered stage, in execution order.
    pub fn descriptors(&self) -> Vec<StageDescriptor> {
        self.stages()
            .map(|s| StageDescriptor {
                name: s.name().to_string(),
                kind: s.kind(),
                inputs: s.inputs(),
                outputs: s.outputs(),
            })
            .collect()
    }

    /// The smallest event count any bounded reader reports, if one exists.
    pub fn min_reader_events(&self) -> Option<u64> {
        self.readers
            .iter()
            .filter_map(|r| match r.available_events() {
                Some(EventAvailability::Bounded(n)) => Some(n),
                _ => None,
            })
            .min()
    }

    /// Structural validation against the run configuration.
    ///
    /// Streaming readers are tolerated only when ordered mode is disabled.
    pub fn validate(&self, ordered: bool) -> Result<(), ConfigurationError> {
        if ordered {
            for reader in &self.readers {
                if matches!(
                    reader.available_events(),
                    Some(EventAvailability::Streaming)
                ) {
                    return Err(ConfigurationError::StreamingReaderOrdered {
                        name: reader.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn add_stage(
        &mut self,
        stage: Arc<dyn Stage>,
        registered: StageKind,
    ) -> Result<(), ConfigurationError> {
        if stage.kind() != registered {
            return Err(ConfigurationError::KindMismatch {
                name: stage.name().to_string(),
                declared: stage.kind(),
                registered,
            });
        }

        let name = stage.name().to_string();
        self.check_fresh_name(&name)?;

        let slot = match registered {
            StageKind::Reader => &mut self.readers,
            StageKind::Algorithm => &mut self.algorithms,
            StageKind::Writer => &mut self.writers,
        };
        slot.push(stage);
        Ok(())
    }

    fn check_fresh_name(&self, name: &str) -> Result<(), ConfigurationError> {
        let taken = self.stages().any(|s| s.name() == name)
            || self.decorators.iter().any(|d| d.name() == name);
        if taken {
            return Err(ConfigurationError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("decorators", &self.decorators.len())
            .field("readers", &self.readers.len())
            .field("algorithms", &self.algorithms.len())
            .field("writers", &self.writers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_store::EventStore;
    use crate::core::stage::StageError;
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        kind: StageKind,
        events: Option<EventAvailability>,
    }

    #[async_trait]
    impl Stage for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> StageKind {
            self.kind
        }

        fn available_events(&self) -> Option<EventAvailability> {
            self.events
        }

        async fn process(&self, _event: u64, _store: &mut EventStore) -> Result<(), StageError> {
            Ok(())
        }
    }

    fn reader(name: &'static str, events: u64) -> Arc<dyn Stage> {
        Arc::new(Fixed {
            name,
            kind: StageKind::Reader,
            events: Some(EventAvailability::Bounded(events)),
        })
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut pipeline = Pipeline::new();
        let algo = Arc::new(Fixed {
            name: "smear",
            kind: StageKind::Algorithm,
            events: None,
        });

        let err = pipeline.add_writer(algo).unwrap_err();
        assert!(matches!(err, ConfigurationError::KindMismatch { .. }));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.add_reader(reader("input", 10)).unwrap();

        let err = pipeline.add_reader(reader("input", 5)).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::DuplicateName {
                name: "input".to_string()
            }
        );
    }

    #[test]
    fn test_min_reader_events_is_minimum() {
        let mut pipeline = Pipeline::new();
        pipeline.add_reader(reader("hits", 10)).unwrap();
        pipeline.add_reader(reader("truth", 7)).unwrap();

        assert_eq!(pipeline.min_reader_events(), Some(7));
    }

    #[test]
    fn test_streaming_reader_needs_unordered() {
        let mut pipeline = Pipeline::new();
        pipeline
            .add_reader(Arc::new(Fixed {
                name: "stream",
                kind: StageKind::Reader,
                events: Some(EventAvailability::Streaming),
            }))
            .unwrap();

        assert!(matches!(
            pipeline.validate(true),
            Err(ConfigurationError::StreamingReaderOrdered { .. })
        ));
        assert!(pipeline.validate(false).is_ok());
    }

    #[test]
    fn test_mark_critical_requires_known_stage() {
        let mut pipeline = Pipeline::new();
        pipeline.add_reader(reader("input", 1)).unwrap();

        assert!(pipeline.mark_critical("input").is_ok());
        assert!(pipeline.is_critical("input"));

        let err = pipeline.mark_critical("ghost").unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownStage { .. }));
    }

    #[test]
    fn test_descriptors_follow_execution_order() {
        let mut pipeline = Pipeline::new();
        pipeline
            .add_writer(Arc::new(Fixed {
                name: "sink",
                kind: StageKind::Writer,
                events: None,
            }))
            .unwrap();
        pipeline.add_reader(reader("input", 3)).unwrap();
        pipeline
            .add_algorithm(Arc::new(Fixed {
                name: "fit",
                kind: StageKind::Algorithm,
                events: None,
            }))
            .unwrap();

        let names: Vec<String> = pipeline.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["input", "fit", "sink"]);
    }
}
