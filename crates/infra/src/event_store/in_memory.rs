use std::collections::HashMap;
use std::sync::RwLock;

use portcullis_core::{AggregateId, ExpectedVersion, InstanceId};

use super::query::EventFilter;
use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    instance_id: InstanceId,
    aggregate_type: String,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Every committed event in commit order, for filtered reads.
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };

        // All events must target the same stream.
        let key = StreamKey {
            instance_id: first.instance_id.clone(),
            aggregate_type: first.aggregate_type.clone(),
            aggregate_id: first.aggregate_id.clone(),
        };

        for (idx, e) in events.iter().enumerate() {
            if e.instance_id != key.instance_id {
                return Err(EventStoreError::InstanceIsolation(format!(
                    "batch contains multiple instance_ids (index {idx})"
                )));
            }
            if e.aggregate_id != key.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != key.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;
        let Inner { streams, log } = &mut *inner;

        let stream = streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        for (offset, e) in events.into_iter().enumerate() {
            committed.push(StoredEvent {
                event_id: e.event_id,
                instance_id: e.instance_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                resource_owner: e.resource_owner,
                sequence_number: current + 1 + offset as u64,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            });
        }
        stream.extend(committed.iter().cloned());
        log.extend(committed.iter().cloned());

        Ok(committed)
    }

    fn load_stream(
        &self,
        instance_id: &InstanceId,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            instance_id: instance_id.clone(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.clone(),
        };

        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn filter(
        &self,
        instance_id: &InstanceId,
        filter: &EventFilter,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        Ok(inner
            .log
            .iter()
            .filter(|e| e.instance_id == *instance_id && filter.matches(e))
            .cloned()
            .collect())
    }
}
