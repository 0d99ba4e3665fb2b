//! Projection runner utilities (read model builders).
//!
//! Read models are **disposable**; events are the source of truth.
//! The runner provides deterministic replay and per-stream cursor tracking
//! without making storage assumptions.

use std::collections::HashMap;

use portcullis_core::{AggregateId, InstanceId};
use thiserror::Error;

use crate::{EventEnvelope, Projection};

/// Progress of a projection on one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    instance_id: InstanceId,
    aggregate_type: String,
    aggregate_id: AggregateId,
    last_sequence_number: u64,
}

impl ProjectionCursor {
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_id(&self) -> &AggregateId {
        &self.aggregate_id
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Error)]
pub enum ProjectionError<E: core::fmt::Debug> {
    #[error("envelope for instance {found} delivered to runner pinned to {expected}")]
    InstanceMismatch {
        expected: InstanceId,
        found: InstanceId,
    },
    #[error("projection failed at sequence {sequence}: {error:?}")]
    Apply { sequence: u64, error: E },
}

/// What the runner did with an envelope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The sequence was already applied for this stream (redelivery).
    Skipped,
}

type StreamKey = (InstanceId, String, AggregateId);

/// Runs envelopes through a projection and tracks progress per stream.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    pinned_instance: Option<InstanceId>,
    cursors: HashMap<StreamKey, u64>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            pinned_instance: None,
            cursors: HashMap::new(),
        }
    }

    /// Create a runner that refuses envelopes of any other instance.
    pub fn new_for_instance(instance_id: InstanceId, projection: P) -> Self {
        Self {
            projection,
            pinned_instance: Some(instance_id),
            cursors: HashMap::new(),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Cursor of one stream, if any envelope of it was applied.
    pub fn cursor(
        &self,
        instance_id: &InstanceId,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Option<ProjectionCursor> {
        self.cursors
            .get(&(instance_id.clone(), aggregate_type.to_string(), aggregate_id.clone()))
            .map(|last| ProjectionCursor {
                instance_id: instance_id.clone(),
                aggregate_type: aggregate_type.to_string(),
                aggregate_id: aggregate_id.clone(),
                last_sequence_number: *last,
            })
    }

    /// Apply a single envelope in stream order.
    ///
    /// Envelopes at or below the stream's cursor are skipped, which makes
    /// redelivery harmless. The cursor only advances when the projection
    /// succeeds.
    pub fn apply(
        &mut self,
        envelope: &EventEnvelope<P::Payload>,
    ) -> Result<ApplyOutcome, ProjectionError<P::Error>> {
        if let Some(expected) = &self.pinned_instance {
            if expected != envelope.instance_id() {
                return Err(ProjectionError::InstanceMismatch {
                    expected: expected.clone(),
                    found: envelope.instance_id().clone(),
                });
            }
        }

        let key = (
            envelope.instance_id().clone(),
            envelope.aggregate_type().to_string(),
            envelope.aggregate_id().clone(),
        );
        let sequence = envelope.sequence_number();
        if self.cursors.get(&key).is_some_and(|last| sequence <= *last) {
            return Ok(ApplyOutcome::Skipped);
        }

        self.projection
            .apply(envelope)
            .map_err(|error| ProjectionError::Apply { sequence, error })?;
        self.cursors.insert(key, sequence);
        Ok(ApplyOutcome::Applied)
    }

    /// Apply many envelopes in order, stopping at the first failure.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Payload>>,
    ) -> Result<(), ProjectionError<P::Error>>
    where
        P::Payload: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying the full event history.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Payload>>,
    ) -> Result<Self, ProjectionError<P::Error>>
    where
        P::Payload: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok(runner)
    }
}
