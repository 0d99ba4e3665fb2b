//! The closed set of instance features and their event-type mapping.
//!
//! Event types follow `feature.instance.<key>.set`. The mapping is generated
//! from [`Feature`] in one place ([`Feature::set_event_type`]) and parsed back
//! with a checked inverse ([`Feature::from_event_type`]), so adding a feature
//! cannot silently desynchronize writers and readers.

use serde::{Deserialize, Serialize};

use portcullis_core::{DomainError, DomainResult};

pub const EVENT_TYPE_PREFIX: &str = "feature.instance";
pub const RESET_EVENT_TYPE: &str = "feature.instance.reset";

/// Known instance feature keys.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    LoginDefaultOrg,
    TriggerIntrospectionProjections,
    LegacyIntrospection,
}

/// Concrete value type a feature stores.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
}

impl Feature {
    pub const ALL: [Feature; 3] = [
        Feature::LoginDefaultOrg,
        Feature::TriggerIntrospectionProjections,
        Feature::LegacyIntrospection,
    ];

    /// Key used in event types and as the projection's `key` column.
    pub fn key(self) -> &'static str {
        match self {
            Feature::LoginDefaultOrg => "login_default_org",
            Feature::TriggerIntrospectionProjections => "trigger_introspection_projections",
            Feature::LegacyIntrospection => "legacy_introspection",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    pub fn set_event_type(self) -> &'static str {
        match self {
            Feature::LoginDefaultOrg => "feature.instance.login_default_org.set",
            Feature::TriggerIntrospectionProjections => {
                "feature.instance.trigger_introspection_projections.set"
            }
            Feature::LegacyIntrospection => "feature.instance.legacy_introspection.set",
        }
    }

    pub fn value_kind(self) -> ValueKind {
        match self {
            Feature::LoginDefaultOrg
            | Feature::TriggerIntrospectionProjections
            | Feature::LegacyIntrospection => ValueKind::Bool,
        }
    }

    /// Parse the feature out of a `feature.instance.<key>.set` event type.
    ///
    /// Anything else is treated as corrupt log data.
    pub fn from_event_type(event_type: &str) -> DomainResult<Self> {
        let segments: Vec<&str> = event_type.split('.').collect();
        let [scope, level, key, action] = segments.as_slice() else {
            return Err(DomainError::internal(
                "PROJ-FEAT-01",
                "Errors.Projection.WrongEventType",
                format!("malformed feature event type {event_type:?}"),
            ));
        };
        if format!("{scope}.{level}") != EVENT_TYPE_PREFIX || *action != "set" {
            return Err(DomainError::internal(
                "PROJ-FEAT-01",
                "Errors.Projection.WrongEventType",
                format!("not a feature set event type {event_type:?}"),
            ));
        }
        Self::from_key(key).ok_or_else(|| {
            DomainError::internal(
                "PROJ-FEAT-02",
                "Errors.Projection.UnknownFeature",
                format!("unknown feature key {key:?} in {event_type:?}"),
            )
        })
    }
}

impl core::fmt::Display for Feature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use portcullis_core::ErrorKind;

    use super::*;

    #[test]
    fn event_type_mapping_round_trips_for_every_feature() {
        for feature in Feature::ALL {
            assert_eq!(Feature::from_event_type(feature.set_event_type()).unwrap(), feature);
            assert!(feature.set_event_type().contains(feature.key()));
        }
    }

    #[test]
    fn malformed_event_types_are_internal_errors() {
        for bad in [
            "feature.instance.reset",
            "feature.instance.login_default_org",
            "feature.instance.login_default_org.set.extra",
            "user.human.login_default_org.set",
            "feature.instance.login_default_org.removed",
        ] {
            let err = Feature::from_event_type(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Internal, "{bad}");
        }
    }

    #[test]
    fn unknown_feature_keys_are_internal_errors() {
        let err = Feature::from_event_type("feature.instance.time_travel.set").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.message_key(), "Errors.Projection.UnknownFeature");
    }
}
