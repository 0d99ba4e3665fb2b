use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use portcullis_core::{AggregateId, DomainError, ExpectedVersion, InstanceId, OrgId};
use portcullis_events::{EventEnvelope, StreamPosition};
use std::sync::Arc;

use super::query::EventFilter;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Events go through this lifecycle:
///
/// 1. **Domain event**: decided by an aggregate's `handle()`
/// 2. **UncommittedEvent**: serialized and wrapped with stream metadata
/// 3. **StoredEvent**: persisted with its assigned `sequence_number`
/// 4. **EventEnvelope**: published to the bus for projections
///
/// Use [`UncommittedEvent::from_typed`] to build one from a typed domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub instance_id: InstanceId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub resource_owner: OrgId,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A persisted event with its position in its stream.
///
/// Sequence numbers start at 1 and increase by one per event, without gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub instance_id: InstanceId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub resource_owner: OrgId,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into an envelope for publication.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            StreamPosition {
                instance_id: self.instance_id.clone(),
                aggregate_id: self.aggregate_id.clone(),
                aggregate_type: self.aggregate_type.clone(),
                resource_owner: self.resource_owner.clone(),
                sequence_number: self.sequence_number,
            },
            self.event_type.clone(),
            self.occurred_at,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// Infrastructure errors (storage, concurrency, isolation) as opposed to
/// domain errors (validation, state machine).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("instance isolation violation: {0}")]
    InstanceIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<EventStoreError> for DomainError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DomainError::conflict(msg),
            other => DomainError::internal("EVENTSTORE-01", "Errors.Internal", other.to_string()),
        }
    }
}

/// Append-only, instance-scoped event store.
///
/// Events are organized into streams keyed by `(instance_id, aggregate_type,
/// aggregate_id)`; the instance and its feature set, for example, share an id.
///
/// `append()`:
/// - requires every event of the batch to target the same stream
/// - checks the expected version against the current stream version
/// - assigns sequence numbers starting at `current_version + 1`
/// - persists the whole batch or nothing
///
/// `load_stream()` returns one stream in sequence order (empty when the
/// aggregate does not exist yet). `filter()` returns the matching events of an
/// instance across streams, in commit order.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn load_stream(
        &self,
        instance_id: &InstanceId,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn filter(
        &self,
        instance_id: &InstanceId,
        filter: &EventFilter,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(
        &self,
        instance_id: &InstanceId,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(instance_id, aggregate_type, aggregate_id)
    }

    fn filter(
        &self,
        instance_id: &InstanceId,
        filter: &EventFilter,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).filter(instance_id, filter)
    }
}

impl UncommittedEvent {
    /// Serialize a typed domain event and capture its metadata.
    pub fn from_typed<E>(
        instance_id: InstanceId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        resource_owner: OrgId,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: portcullis_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            instance_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            resource_owner,
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
