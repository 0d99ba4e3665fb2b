use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use portcullis_core::{DomainError, InstanceId};

/// One row of `projections.instance_features`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEntry {
    pub instance_id: InstanceId,
    pub key: String,
    /// Date of the event that first set the key; never updated.
    pub creation_date: DateTime<Utc>,
    pub change_date: DateTime<Utc>,
    pub sequence: u64,
    pub value: JsonValue,
}

#[derive(Debug, Error)]
pub enum FeatureStoreError {
    #[error("feature store lock poisoned")]
    Poisoned,

    #[error("no async runtime available: {0}")]
    Runtime(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<FeatureStoreError> for DomainError {
    fn from(value: FeatureStoreError) -> Self {
        DomainError::internal("PROJ-FEAT-STORE", "Errors.Internal", value.to_string())
    }
}

/// Instance-partitioned storage behind the feature projection.
pub trait FeatureStore: Send + Sync {
    /// Insert or update `(instance_id, key)`. `creation_date` is set from
    /// `event_date` on insert only.
    fn upsert(
        &self,
        instance_id: &InstanceId,
        key: &str,
        value: JsonValue,
        sequence: u64,
        event_date: DateTime<Utc>,
    ) -> Result<(), FeatureStoreError>;

    /// Remove every row of the instance. Removing nothing is not an error.
    fn delete_instance(&self, instance_id: &InstanceId) -> Result<(), FeatureStoreError>;

    fn get(&self, instance_id: &InstanceId, key: &str) -> Result<Option<FeatureEntry>, FeatureStoreError>;

    /// Rows of one instance ordered by key.
    fn list(&self, instance_id: &InstanceId) -> Result<Vec<FeatureEntry>, FeatureStoreError>;
}

impl<S> FeatureStore for Arc<S>
where
    S: FeatureStore + ?Sized,
{
    fn upsert(
        &self,
        instance_id: &InstanceId,
        key: &str,
        value: JsonValue,
        sequence: u64,
        event_date: DateTime<Utc>,
    ) -> Result<(), FeatureStoreError> {
        (**self).upsert(instance_id, key, value, sequence, event_date)
    }

    fn delete_instance(&self, instance_id: &InstanceId) -> Result<(), FeatureStoreError> {
        (**self).delete_instance(instance_id)
    }

    fn get(&self, instance_id: &InstanceId, key: &str) -> Result<Option<FeatureEntry>, FeatureStoreError> {
        (**self).get(instance_id, key)
    }

    fn list(&self, instance_id: &InstanceId) -> Result<Vec<FeatureEntry>, FeatureStoreError> {
        (**self).list(instance_id)
    }
}

/// In-memory feature table for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryFeatureStore {
    rows: RwLock<BTreeMap<(InstanceId, String), FeatureEntry>>,
}

impl InMemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FeatureStore for InMemoryFeatureStore {
    fn upsert(
        &self,
        instance_id: &InstanceId,
        key: &str,
        value: JsonValue,
        sequence: u64,
        event_date: DateTime<Utc>,
    ) -> Result<(), FeatureStoreError> {
        let mut rows = self.rows.write().map_err(|_| FeatureStoreError::Poisoned)?;
        rows.entry((instance_id.clone(), key.to_string()))
            .and_modify(|row| {
                row.change_date = event_date;
                row.sequence = sequence;
                row.value = value.clone();
            })
            .or_insert_with(|| FeatureEntry {
                instance_id: instance_id.clone(),
                key: key.to_string(),
                creation_date: event_date,
                change_date: event_date,
                sequence,
                value: value.clone(),
            });
        Ok(())
    }

    fn delete_instance(&self, instance_id: &InstanceId) -> Result<(), FeatureStoreError> {
        let mut rows = self.rows.write().map_err(|_| FeatureStoreError::Poisoned)?;
        rows.retain(|(instance, _), _| instance != instance_id);
        Ok(())
    }

    fn get(&self, instance_id: &InstanceId, key: &str) -> Result<Option<FeatureEntry>, FeatureStoreError> {
        let rows = self.rows.read().map_err(|_| FeatureStoreError::Poisoned)?;
        Ok(rows.get(&(instance_id.clone(), key.to_string())).cloned())
    }

    fn list(&self, instance_id: &InstanceId) -> Result<Vec<FeatureEntry>, FeatureStoreError> {
        let rows = self.rows.read().map_err(|_| FeatureStoreError::Poisoned)?;
        Ok(rows
            .iter()
            .filter(|((instance, _), _)| instance == instance_id)
            .map(|(_, row)| row.clone())
            .collect())
    }
}
