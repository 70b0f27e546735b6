//! Per-event typed whiteboard.
//!
//! Each event in flight owns exactly one `EventStore`. Stages exchange data
//! through it under string keys with the value type enforced at both the
//! write and the read boundary. Keys are write-once; the whole store is
//! dropped when its event leaves the pipeline.

use std::any::Any;
use std::collections::HashMap;

use thiserror::Error;

/// Errors raised by whiteboard access.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventStoreError {
    /// A key was written a second time within the same event.
    #[error("key '{key}' already written for event {event}")]
    DuplicateKey { event: u64, key: String },

    /// A key was read before any stage wrote it.
    #[error("key '{key}' not present for event {event}")]
    MissingKey { event: u64, key: String },

    /// A key was read with a different type than it was written with.
    #[error("key '{key}' for event {event} holds {stored}, requested {requested}")]
    TypeMismatch {
        event: u64,
        key: String,
        stored: &'static str,
        requested: &'static str,
    },
}

/// One stored value plus the type name it was written with.
///
/// The type name is redundant with the `Any` type id but makes
/// `TypeMismatch` errors readable.
struct Slot {
    type_name: &'static str,
    value: Box<dyn Any + Send>,
}

/// The per-event, name-keyed, typed data store ("whiteboard").
///
/// Values are write-once per key. Reads never mutate. There is no removal:
/// the store lives exactly as long as its event's trip through the pipeline.
pub struct EventStore {
    event: u64,
    slots: HashMap<String, Slot>,
}

impl EventStore {
    /// Create an empty store for the given event index.
    pub fn new(event: u64) -> Self {
        Self {
            event,
            slots: HashMap::new(),
        }
    }

    /// The event index this store belongs to.
    pub fn event(&self) -> u64 {
        self.event
    }

    /// Store a value under `key`.
    ///
    /// Fails with `DuplicateKey` if any stage of this event already wrote
    /// the key, regardless of type.
    pub fn put<T>(&mut self, key: impl Into<String>, value: T) -> Result<(), EventStoreError>
    where
        T: Send + 'static,
    {
        let key = key.into();
        if self.slots.contains_key(&key) {
            return Err(EventStoreError::DuplicateKey {
                event: self.event,
                key,
            });
        }

        self.slots.insert(
            key,
            Slot {
                type_name: std::any::type_name::<T>(),
                value: Box::new(value),
            },
        );
        Ok(())
    }

    /// Read a value previously written under `key`.
    ///
    /// Fails with `MissingKey` if no stage wrote the key, or `TypeMismatch`
    /// if it was written with a different type.
    pub fn get<T>(&self, key: &str) -> Result<&T, EventStoreError>
    where
        T: 'static,
    {
        let slot = self
            .slots
            .get(key)
            .ok_or_else(|| EventStoreError::MissingKey {
                event: self.event,
                key: key.to_string(),
            })?;

        slot.value
            .downcast_ref::<T>()
            .ok_or_else(|| EventStoreError::TypeMismatch {
                event: self.event,
                key: key.to_string(),
                stored: slot.type_name,
                requested: std::any::type_name::<T>(),
            })
    }

    /// Whether `key` has been written for this event. Never fails.
    pub fn exists(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of keys written so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no key has been written yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate over the written keys, in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("event", &self.event)
            .field("keys", &self.slots.len())
            .finish()
    }
}
