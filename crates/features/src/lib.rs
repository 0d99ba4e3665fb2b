//! `portcullis-features`: instance feature flags.
//!
//! Holds the closed set of feature keys, the event-type mapping used by
//! writers and projections, and the per-instance feature aggregate.

pub mod event;
pub mod feature;
pub mod instance_features;

pub use event::{FeatureEvent, FeatureSet, FeatureValue, FeaturesReset};
pub use feature::{EVENT_TYPE_PREFIX, Feature, RESET_EVENT_TYPE, ValueKind};
pub use instance_features::{
    AGGREGATE_TYPE, FeatureCommand, InstanceFeatures, ResetFeatures, SetFeature,
};
