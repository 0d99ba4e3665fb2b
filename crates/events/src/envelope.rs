use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use portcullis_core::{AggregateId, InstanceId, OrgId};

/// Envelope for a committed event, carrying instance and stream metadata.
///
/// Notes:
/// - **Multi-tenancy** is enforced here via `instance_id`.
/// - `sequence_number` is strictly increasing per `(instance_id, aggregate_type, aggregate_id)` stream.
/// - `created_at` is the event's business time; projections use it as their clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    instance_id: InstanceId,

    aggregate_id: AggregateId,
    aggregate_type: String,
    resource_owner: OrgId,

    sequence_number: u64,
    event_type: String,
    created_at: DateTime<Utc>,

    payload: E,
}

/// Stream coordinates of an envelope, used to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPosition {
    pub instance_id: InstanceId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub resource_owner: OrgId,
    pub sequence_number: u64,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        position: StreamPosition,
        event_type: impl Into<String>,
        created_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            instance_id: position.instance_id,
            aggregate_id: position.aggregate_id,
            aggregate_type: position.aggregate_type,
            resource_owner: position.resource_owner,
            sequence_number: position.sequence_number,
            event_type: event_type.into(),
            created_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn aggregate_id(&self) -> &AggregateId {
        &self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn resource_owner(&self) -> &OrgId {
        &self.resource_owner
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
