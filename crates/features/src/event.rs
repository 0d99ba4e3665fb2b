use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portcullis_core::{DomainError, DomainResult};
use portcullis_events::Event;

use crate::feature::{Feature, RESET_EVENT_TYPE, ValueKind};

/// A feature was set to a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet<T> {
    pub value: T,
    pub occurred_at: DateTime<Utc>,
}

/// All features of an instance were reset to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesReset {
    pub occurred_at: DateTime<Utc>,
}

/// All instance feature events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureEvent {
    LoginDefaultOrgSet(FeatureSet<bool>),
    TriggerIntrospectionProjectionsSet(FeatureSet<bool>),
    LegacyIntrospectionSet(FeatureSet<bool>),
    Reset(FeaturesReset),
}

/// Typed value of a feature, decoded according to [`Feature::value_kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureValue {
    Bool(bool),
}

impl FeatureValue {
    /// Decode a loosely typed value into the feature's concrete type.
    pub fn decode(feature: Feature, value: &serde_json::Value) -> DomainResult<Self> {
        match feature.value_kind() {
            ValueKind::Bool => value
                .as_bool()
                .map(FeatureValue::Bool)
                .ok_or(DomainError::invalid_argument(
                    "FEAT-VAL-01",
                    "Errors.Feature.InvalidValue",
                )),
        }
    }

    pub fn to_json(self) -> serde_json::Value {
        match self {
            FeatureValue::Bool(v) => serde_json::Value::Bool(v),
        }
    }
}

impl FeatureEvent {
    /// Build the set event for `feature`.
    pub fn set(feature: Feature, value: FeatureValue, occurred_at: DateTime<Utc>) -> Self {
        let FeatureValue::Bool(value) = value;
        let payload = FeatureSet { value, occurred_at };
        match feature {
            Feature::LoginDefaultOrg => FeatureEvent::LoginDefaultOrgSet(payload),
            Feature::TriggerIntrospectionProjections => {
                FeatureEvent::TriggerIntrospectionProjectionsSet(payload)
            }
            Feature::LegacyIntrospection => FeatureEvent::LegacyIntrospectionSet(payload),
        }
    }

    /// Feature and value carried by a set event, `None` for a reset.
    pub fn set_value(&self) -> Option<(Feature, FeatureValue)> {
        match self {
            FeatureEvent::LoginDefaultOrgSet(e) => {
                Some((Feature::LoginDefaultOrg, FeatureValue::Bool(e.value)))
            }
            FeatureEvent::TriggerIntrospectionProjectionsSet(e) => Some((
                Feature::TriggerIntrospectionProjections,
                FeatureValue::Bool(e.value),
            )),
            FeatureEvent::LegacyIntrospectionSet(e) => {
                Some((Feature::LegacyIntrospection, FeatureValue::Bool(e.value)))
            }
            FeatureEvent::Reset(_) => None,
        }
    }
}

impl Event for FeatureEvent {
    fn event_type(&self) -> &'static str {
        match self.set_value() {
            Some((feature, _)) => feature.set_event_type(),
            None => RESET_EVENT_TYPE,
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FeatureEvent::LoginDefaultOrgSet(e)
            | FeatureEvent::TriggerIntrospectionProjectionsSet(e)
            | FeatureEvent::LegacyIntrospectionSet(e) => e.occurred_at,
            FeatureEvent::Reset(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use portcullis_core::ErrorKind;
    use serde_json::json;

    use super::*;

    #[test]
    fn set_event_type_comes_from_the_feature() {
        for feature in Feature::ALL {
            let ev = FeatureEvent::set(feature, FeatureValue::Bool(true), Utc::now());
            assert_eq!(ev.event_type(), feature.set_event_type());
            assert_eq!(ev.set_value(), Some((feature, FeatureValue::Bool(true))));
        }
        let reset = FeatureEvent::Reset(FeaturesReset { occurred_at: Utc::now() });
        assert_eq!(reset.event_type(), RESET_EVENT_TYPE);
    }

    #[test]
    fn bool_features_reject_other_json_types() {
        assert_eq!(
            FeatureValue::decode(Feature::LoginDefaultOrg, &json!(false)).unwrap(),
            FeatureValue::Bool(false)
        );
        let err = FeatureValue::decode(Feature::LoginDefaultOrg, &json!("yes")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
