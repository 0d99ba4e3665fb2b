use serde_json::Value as JsonValue;

use portcullis_core::{AggregateId, DomainResult, InstanceId, ObjectDetails, OrgId};
use portcullis_events::{EventBus, EventEnvelope};
use portcullis_features::{AGGREGATE_TYPE, Feature, FeatureCommand, InstanceFeatures, ResetFeatures, SetFeature};

use super::{Commands, now, require_instance};
use crate::command_dispatcher::StreamTarget;
use crate::event_store::EventStore;

impl<S, B> Commands<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Set one instance feature. `value` must match the feature's value kind.
    #[tracing::instrument(skip(self))]
    pub fn set_instance_feature(
        &self,
        instance_id: &InstanceId,
        feature: Feature,
        value: JsonValue,
    ) -> DomainResult<ObjectDetails> {
        self.execute_features(
            instance_id,
            FeatureCommand::Set(SetFeature {
                feature,
                value,
                occurred_at: now(),
            }),
        )
    }

    /// Drop every feature value of the instance.
    #[tracing::instrument(skip(self))]
    pub fn reset_instance_features(&self, instance_id: &InstanceId) -> DomainResult<ObjectDetails> {
        self.execute_features(instance_id, FeatureCommand::Reset(ResetFeatures { occurred_at: now() }))
    }

    fn execute_features(&self, instance_id: &InstanceId, command: FeatureCommand) -> DomainResult<ObjectDetails> {
        require_instance(instance_id)?;
        let loaded = self.dispatcher.load(
            instance_id,
            AGGREGATE_TYPE,
            &AggregateId::from(instance_id),
            InstanceFeatures::empty(instance_id.clone()),
        )?;
        let owner = OrgId::new(instance_id.as_str());
        let target = StreamTarget::new(instance_id, instance_id, AGGREGATE_TYPE, &owner);
        self.commit(&target, &loaded, &command)
    }
}
