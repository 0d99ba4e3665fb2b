//! Postgres-backed feature store.
//!
//! Rows live in `projections.instance_features`, keyed by
//! `(instance_id, key)`. Every statement filters on `instance_id`, so one
//! instance can never read or clear another's rows.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row, postgres::PgRow};
use tokio::runtime::{Handle, RuntimeFlavor};

use portcullis_core::InstanceId;

use super::{FeatureEntry, FeatureStore, FeatureStoreError};

const CREATE_SCHEMA: &str = "CREATE SCHEMA IF NOT EXISTS projections";

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS projections.instance_features (
    instance_id   TEXT        NOT NULL,
    key           TEXT        NOT NULL,
    creation_date TIMESTAMPTZ NOT NULL,
    change_date   TIMESTAMPTZ NOT NULL,
    sequence      BIGINT      NOT NULL,
    value         JSONB       NOT NULL,
    PRIMARY KEY (instance_id, key)
)
"#;

/// Feature store over a sqlx pool.
///
/// The [`FeatureStore`] trait is synchronous; queries are driven to
/// completion on `handle`. Called from inside a runtime, that runtime must be
/// multi-threaded.
pub struct PostgresFeatureStore {
    pool: PgPool,
    handle: Handle,
}

impl PostgresFeatureStore {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self { pool, handle }
    }

    /// Bind to the runtime the caller runs in.
    pub fn from_current(pool: PgPool) -> Result<Self, FeatureStoreError> {
        let handle = Handle::try_current().map_err(|e| FeatureStoreError::Runtime(e.to_string()))?;
        Ok(Self::new(pool, handle))
    }

    /// Create the schema and table when missing.
    pub fn init(&self) -> Result<(), FeatureStoreError> {
        let pool = self.pool.clone();
        self.run(async move {
            sqlx::query(CREATE_SCHEMA).execute(&pool).await?;
            sqlx::query(CREATE_TABLE).execute(&pool).await?;
            Ok(())
        })
    }

    fn run<F, T>(&self, fut: F) -> Result<T, FeatureStoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        let result = match Handle::try_current() {
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                return Err(FeatureStoreError::Runtime(
                    "blocking feature store call on a current-thread runtime".to_string(),
                ));
            }
            Ok(_) => tokio::task::block_in_place(|| self.handle.block_on(fut)),
            Err(_) => self.handle.block_on(fut),
        };
        result.map_err(|e| {
            tracing::warn!(error = %e, "feature store query failed");
            FeatureStoreError::Storage(e.to_string())
        })
    }
}

fn row_to_entry(row: &PgRow) -> Result<FeatureEntry, sqlx::Error> {
    let sequence = decode_sequence(row.try_get("sequence")?)?;
    Ok(FeatureEntry {
        instance_id: InstanceId::new(row.try_get::<String, _>("instance_id")?),
        key: row.try_get("key")?,
        creation_date: row.try_get("creation_date")?,
        change_date: row.try_get("change_date")?,
        sequence,
        value: row.try_get("value")?,
    })
}

/// Sequences are stored as BIGINT; a negative one is a corrupt row.
fn decode_sequence(raw: i64) -> Result<u64, sqlx::Error> {
    u64::try_from(raw).map_err(|e| sqlx::Error::Decode(format!("sequence {raw}: {e}").into()))
}

impl FeatureStore for PostgresFeatureStore {
    fn upsert(
        &self,
        instance_id: &InstanceId,
        key: &str,
        value: JsonValue,
        sequence: u64,
        event_date: DateTime<Utc>,
    ) -> Result<(), FeatureStoreError> {
        let sequence = i64::try_from(sequence).map_err(|e| FeatureStoreError::Storage(e.to_string()))?;
        let pool = self.pool.clone();
        let instance = instance_id.as_str().to_string();
        let key = key.to_string();
        self.run(async move {
            sqlx::query(
                r#"
                INSERT INTO projections.instance_features
                    (instance_id, key, creation_date, change_date, sequence, value)
                VALUES ($1, $2, $3, $3, $4, $5)
                ON CONFLICT (instance_id, key) DO UPDATE SET
                    change_date = EXCLUDED.change_date,
                    sequence = EXCLUDED.sequence,
                    value = EXCLUDED.value
                "#,
            )
            .bind(instance)
            .bind(key)
            .bind(event_date)
            .bind(sequence)
            .bind(value)
            .execute(&pool)
            .await?;
            Ok(())
        })
    }

    fn delete_instance(&self, instance_id: &InstanceId) -> Result<(), FeatureStoreError> {
        let pool = self.pool.clone();
        let instance = instance_id.as_str().to_string();
        self.run(async move {
            sqlx::query("DELETE FROM projections.instance_features WHERE instance_id = $1")
                .bind(instance)
                .execute(&pool)
                .await?;
            Ok(())
        })
    }

    fn get(&self, instance_id: &InstanceId, key: &str) -> Result<Option<FeatureEntry>, FeatureStoreError> {
        let pool = self.pool.clone();
        let instance = instance_id.as_str().to_string();
        let key = key.to_string();
        self.run(async move {
            let row = sqlx::query(
                r#"
                SELECT instance_id, key, creation_date, change_date, sequence, value
                FROM projections.instance_features
                WHERE instance_id = $1 AND key = $2
                "#,
            )
            .bind(instance)
            .bind(key)
            .fetch_optional(&pool)
            .await?;
            row.as_ref().map(row_to_entry).transpose()
        })
    }

    fn list(&self, instance_id: &InstanceId) -> Result<Vec<FeatureEntry>, FeatureStoreError> {
        let pool = self.pool.clone();
        let instance = instance_id.as_str().to_string();
        self.run(async move {
            let rows = sqlx::query(
                r#"
                SELECT instance_id, key, creation_date, change_date, sequence, value
                FROM projections.instance_features
                WHERE instance_id = $1
                ORDER BY key
                "#,
            )
            .bind(instance)
            .fetch_all(&pool)
            .await?;
            rows.iter().map(row_to_entry).collect()
        })
    }
}
