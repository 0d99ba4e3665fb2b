//! Projection implementations (read model builders).
//!
//! Projections consume committed envelopes and build query-optimized read
//! models. They can be rebuilt from the event log, keep data partitioned by
//! instance, and tolerate at-least-once delivery.

pub mod instance_features;

pub use instance_features::{InstanceFeaturesProjection, PROJECTION_NAME};
