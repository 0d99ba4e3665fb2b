//! Instance feature projection.
//!
//! Folds `feature` aggregate events into one row per `(instance, key)`.
//! A reset event drops every row of its instance.

use serde_json::Value as JsonValue;

use portcullis_core::{DomainError, DomainResult};
use portcullis_events::{EventEnvelope, Projection};
use portcullis_features::{AGGREGATE_TYPE, Feature, FeatureEvent, RESET_EVENT_TYPE};

use crate::read_model::FeatureStore;

pub const PROJECTION_NAME: &str = "projections.instance_features";

/// Projection that maintains the feature table per instance.
pub struct InstanceFeaturesProjection<S> {
    store: S,
}

impl<S> InstanceFeaturesProjection<S>
where
    S: FeatureStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> DomainResult<()> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }
        if envelope.event_type() == RESET_EVENT_TYPE {
            self.store.delete_instance(envelope.instance_id())?;
            return Ok(());
        }

        let feature = Feature::from_event_type(envelope.event_type())?;
        let event: FeatureEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            DomainError::internal(
                "PROJ-FEAT-03",
                "Errors.Projection.InvalidPayload",
                format!("{}: {e}", envelope.event_type()),
            )
        })?;
        let value = match event.set_value() {
            Some((carried, value)) if carried == feature => value,
            _ => {
                return Err(DomainError::internal(
                    "PROJ-FEAT-04",
                    "Errors.Projection.InvalidPayload",
                    format!("payload does not match event type {}", envelope.event_type()),
                ));
            }
        };

        self.store.upsert(
            envelope.instance_id(),
            feature.key(),
            value.to_json(),
            envelope.sequence_number(),
            envelope.created_at(),
        )?;
        tracing::debug!(
            instance_id = %envelope.instance_id().as_str(),
            feature = %feature,
            sequence = envelope.sequence_number(),
            "instance feature projected"
        );
        Ok(())
    }
}

impl<S> Projection for InstanceFeaturesProjection<S>
where
    S: FeatureStore,
{
    type Payload = JsonValue;
    type Error = DomainError;

    fn name(&self) -> &'static str {
        PROJECTION_NAME
    }

    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), DomainError> {
        self.apply_envelope(envelope)
    }
}
