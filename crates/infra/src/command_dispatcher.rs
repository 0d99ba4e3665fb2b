//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (instance-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (for projections)
//! ```
//!
//! Commands that need cross-aggregate lookups between steps 2 and 3 use
//! [`CommandDispatcher::load`] and [`CommandDispatcher::execute`] separately;
//! [`CommandDispatcher::dispatch`] runs the whole pipeline at once.
//!
//! This module contains no IO itself; it composes infrastructure traits.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use portcullis_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, InstanceId, ObjectDetails, OrgId};
use portcullis_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The aggregate rejected the command.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// Loading or persisting failed (includes optimistic concurrency failures).
    #[error(transparent)]
    Store(#[from] EventStoreError),
    /// The store returned events of another stream.
    #[error("instance isolation violation: {0}")]
    InstanceIsolation(String),
    /// Historical event payloads could not be decoded into the aggregate event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<DispatchError> for DomainError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(err) => err,
            DispatchError::Store(err) => err.into(),
            other => DomainError::internal("DISPATCH-01", "Errors.Internal", other.to_string()),
        }
    }
}

/// Identifies the stream a command writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub instance_id: InstanceId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: &'static str,
    pub resource_owner: OrgId,
}

impl StreamTarget {
    pub fn new(
        instance_id: &InstanceId,
        aggregate_id: impl Into<AggregateId>,
        aggregate_type: &'static str,
        resource_owner: &OrgId,
    ) -> Self {
        Self {
            instance_id: instance_id.clone(),
            aggregate_id: aggregate_id.into(),
            aggregate_type,
            resource_owner: resource_owner.clone(),
        }
    }
}

/// An aggregate rebuilt from its stream, with the stream metadata commands need.
#[derive(Debug, Clone)]
pub struct Loaded<A> {
    pub aggregate: A,
    /// Sequence number of the last event (0 for an empty stream).
    pub version: u64,
    /// Resource owner recorded on the stream, `None` for an empty stream.
    pub resource_owner: Option<OrgId>,
    pub last_event_date: Option<DateTime<Utc>>,
}

impl<A> Loaded<A> {
    pub fn exists(&self) -> bool {
        self.version > 0
    }

    /// Details of the unchanged aggregate, used when a command emits nothing.
    pub fn details(&self, fallback_owner: &OrgId) -> ObjectDetails {
        ObjectDetails::new(
            self.version,
            self.last_event_date.unwrap_or_default(),
            self.resource_owner.clone().unwrap_or_else(|| fallback_owner.clone()),
        )
    }
}

/// Details after a successful commit: position and date of the last new event.
pub fn committed_details(committed: &[StoredEvent], resource_owner: &OrgId) -> Option<ObjectDetails> {
    committed
        .last()
        .map(|e| ObjectDetails::new(e.sequence_number, e.occurred_at, resource_owner.clone()))
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// - Events are persisted before publication; if append fails nothing is published.
/// - Each command operates on a single aggregate stream.
/// - If publication fails after a successful append the error is returned; the
///   events are already stored, which gives at-least-once delivery.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate an aggregate from its stream.
    pub fn load<A>(
        &self,
        instance_id: &InstanceId,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
        mut aggregate: A,
    ) -> Result<Loaded<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(instance_id, aggregate_type, aggregate_id)?;
        validate_loaded_stream(instance_id, aggregate_type, aggregate_id, &history)?;
        apply_history(&mut aggregate, &history)?;

        Ok(Loaded {
            aggregate,
            version: stream_version(&history),
            resource_owner: history.first().map(|e| e.resource_owner.clone()),
            last_event_date: history.last().map(|e| e.occurred_at),
        })
    }

    /// Decide events against a loaded aggregate and commit them conditionally
    /// on the version observed at load time.
    ///
    /// Returns the committed events (empty when the command was a no-op).
    pub fn execute<A>(
        &self,
        target: &StreamTarget,
        loaded: &Loaded<A>,
        command: &A::Command,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: portcullis_events::Event + Serialize,
    {
        let decided = loaded.aggregate.handle(command)?;
        self.commit(target, ExpectedVersion::Exact(loaded.version), &decided)
    }

    /// Append already decided events and publish them.
    pub fn commit<E>(
        &self,
        target: &StreamTarget,
        expected: ExpectedVersion,
        events: &[E],
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        E: portcullis_events::Event + Serialize,
    {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let uncommitted = events
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    target.instance_id.clone(),
                    target.aggregate_id.clone(),
                    target.aggregate_type,
                    target.resource_owner.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Load, decide, persist and publish in one step.
    pub fn dispatch<A>(
        &self,
        target: &StreamTarget,
        command: &A::Command,
        aggregate: A,
    ) -> Result<(Loaded<A>, Vec<StoredEvent>), DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: portcullis_events::Event + Serialize + DeserializeOwned,
    {
        let loaded = self.load(&target.instance_id, target.aggregate_type, &target.aggregate_id, aggregate)?;
        let committed = self.execute(target, &loaded, command)?;
        Ok((loaded, committed))
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    instance_id: &InstanceId,
    aggregate_type: &str,
    aggregate_id: &AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce isolation even if a buggy backend returns foreign data.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.instance_id != *instance_id {
            return Err(DispatchError::InstanceIsolation(format!(
                "loaded stream contains wrong instance_id at index {idx}"
            )));
        }
        if e.aggregate_id != *aggregate_id || e.aggregate_type != aggregate_type {
            return Err(DispatchError::InstanceIsolation(format!(
                "loaded stream contains another aggregate at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "gap or reordering in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone()).map_err(|e| {
            DispatchError::Deserialize(format!(
                "{} at sequence {}: {e}",
                stored.event_type, stored.sequence_number
            ))
        })?;
        aggregate.apply(&ev);
    }

    Ok(())
}
