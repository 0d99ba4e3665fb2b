//! Instance-isolated read model storage.

pub mod feature_store;
pub mod postgres;

pub use feature_store::{FeatureEntry, FeatureStore, FeatureStoreError, InMemoryFeatureStore};
pub use postgres::PostgresFeatureStore;
