//! Instance feature aggregate (event-sourced).
//!
//! One stream per instance, aggregate id equal to the instance id.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use portcullis_core::{Aggregate, AggregateRoot, DomainError, InstanceId};

use crate::event::{FeatureEvent, FeatureValue, FeaturesReset};
use crate::feature::Feature;

pub const AGGREGATE_TYPE: &str = "feature";

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InstanceFeatures {
    pub instance_id: InstanceId,
    pub values: BTreeMap<Feature, FeatureValue>,
    pub version: u64,
    pub last_changed: Option<DateTime<Utc>>,
}

impl InstanceFeatures {
    pub fn empty(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            ..Default::default()
        }
    }

    pub fn value(&self, feature: Feature) -> Option<FeatureValue> {
        self.values.get(&feature).copied()
    }
}

impl AggregateRoot for InstanceFeatures {
    type Id = InstanceId;

    fn id(&self) -> &Self::Id {
        &self.instance_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SetFeature {
    pub feature: Feature,
    pub value: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResetFeatures {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum FeatureCommand {
    Set(SetFeature),
    Reset(ResetFeatures),
}

impl Aggregate for InstanceFeatures {
    type Command = FeatureCommand;
    type Event = FeatureEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event.set_value() {
            Some((feature, value)) => {
                self.values.insert(feature, value);
            }
            None => self.values.clear(),
        }
        self.last_changed = Some(portcullis_events::Event::occurred_at(event));
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            FeatureCommand::Set(cmd) => {
                let value = FeatureValue::decode(cmd.feature, &cmd.value)?;
                if self.value(cmd.feature) == Some(value) {
                    return Ok(Vec::new());
                }
                Ok(vec![FeatureEvent::set(cmd.feature, value, cmd.occurred_at)])
            }
            FeatureCommand::Reset(cmd) => {
                if self.values.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![FeatureEvent::Reset(FeaturesReset {
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
