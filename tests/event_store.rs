//! Whiteboard integration tests
//!
//! The typed key-value contract directly, and how its violations surface as
//! per-event failures when real stages collide at run time.

use std::sync::Arc;

use async_trait::async_trait;
use conductor::{
    EventStore, EventStoreError, Orchestrator, Pipeline, RunConfig, Severity, Stage, StageError,
    StageKind,
};

#[test]
fn test_typed_roundtrip() {
    let mut store = EventStore::new(11);

    store.put("tracks", vec!["t1".to_string(), "t2".to_string()]).unwrap();
    store.put("count", 2usize).unwrap();

    let tracks: &Vec<String> = store.get("tracks").unwrap();
    assert_eq!(tracks.len(), 2);
    assert_eq!(*store.get::<usize>("count").unwrap(), 2);
    assert!(store.exists("tracks"));
    assert!(!store.exists("vertices"));
}

#[test]
fn test_contract_violations() {
    let mut store = EventStore::new(0);
    store.put("clusters", 3u32).unwrap();

    assert!(matches!(
        store.get::<u32>("absent"),
        Err(EventStoreError::MissingKey { .. })
    ));
    assert!(matches!(
        store.get::<i64>("clusters"),
        Err(EventStoreError::TypeMismatch { .. })
    ));
    assert!(matches!(
        store.put("clusters", 4u32),
        Err(EventStoreError::DuplicateKey { .. })
    ));
}

#[test]
fn test_store_error_converts_to_recoverable_stage_error() {
    let store = EventStore::new(2);
    let err: StageError = store.get::<u8>("missing").unwrap_err().into();
    assert_eq!(err.severity(), Severity::Recoverable);
}

/// Writes a fixed key; two instances collide on the second write.
struct WritesKey {
    name: &'static str,
    key: &'static str,
}

#[async_trait]
impl Stage for WritesKey {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Algorithm
    }

    fn outputs(&self) -> Vec<String> {
        vec![self.key.to_string()]
    }

    async fn process(&self, event: u64, store: &mut EventStore) -> Result<(), StageError> {
        store.put(self.key, event)?;
        Ok(())
    }
}

/// Reads a key with a deliberately wrong type.
struct ReadsWrongType;

#[async_trait]
impl Stage for ReadsWrongType {
    fn name(&self) -> &str {
        "wrong_type"
    }

    fn kind(&self) -> StageKind {
        StageKind::Algorithm
    }

    async fn process(&self, _event: u64, store: &mut EventStore) -> Result<(), StageError> {
        // Written as u64 by WritesKey; read as String.
        let _: &String = store.get("shared")?;
        Ok(())
    }
}

#[tokio::test]
async fn test_duplicate_write_fails_events_at_run_time() {
    // Declared outputs are advisory: registration accepts the clash, the
    // whiteboard rejects it per event.
    let mut pipeline = Pipeline::new();
    pipeline
        .add_algorithm(Arc::new(WritesKey {
            name: "first_writer",
            key: "shared",
        }))
        .unwrap();
    pipeline
        .add_algorithm(Arc::new(WritesKey {
            name: "second_writer",
            key: "shared",
        }))
        .unwrap();

    let config = RunConfig {
        events: Some(4),
        ..RunConfig::default()
    };
    let stats = Orchestrator::new(config).run(pipeline).await.unwrap();

    assert_eq!(stats.events_failed, 4);
    assert_eq!(stats.events_succeeded, 0);
    assert_eq!(stats.failures_by_stage.get("second_writer"), Some(&4));
    assert_eq!(stats.recoverable_errors, 4);
}

#[tokio::test]
async fn test_type_mismatch_fails_events_at_run_time() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_algorithm(Arc::new(WritesKey {
            name: "producer",
            key: "shared",
        }))
        .unwrap();
    pipeline.add_algorithm(Arc::new(ReadsWrongType)).unwrap();

    let config = RunConfig {
        events: Some(3),
        ..RunConfig::default()
    };
    let stats = Orchestrator::new(config).run(pipeline).await.unwrap();

    assert_eq!(stats.events_failed, 3);
    assert_eq!(stats.failures_by_stage.get("wrong_type"), Some(&3));
}

#[tokio::test]
async fn test_stores_are_isolated_per_event() {
    // The same key is written freshly for every event; if stores leaked
    // across events the second write would be a duplicate.
    let mut pipeline = Pipeline::new();
    pipeline
        .add_algorithm(Arc::new(WritesKey {
            name: "producer",
            key: "shared",
        }))
        .unwrap();

    let config = RunConfig {
        events: Some(50),
        threads: 1,
        ..RunConfig::default()
    };
    let stats = Orchestrator::new(config).run(pipeline).await.unwrap();
    assert_eq!(stats.events_succeeded, 50);
}
