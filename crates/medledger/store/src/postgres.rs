//! PostgreSQL resource store.
//!
//! One row per tracked resource; references live in a JSONB array and are appended
//! with a single `UPDATE`, so concurrent writers never overwrite each other.

use crate::traits::ResourceStore;
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use medledger_types::{LedgerReference, ResourceId, TrackedResource};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;

#[derive(Clone)]
pub struct PostgresResourceStore {
    pool: PgPool,
}

impl PostgresResourceStore {
    /// Connect to PostgreSQL and initialize the schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS medledger_resources (
                resource_id TEXT PRIMARY KEY,
                transaction_ids JSONB NOT NULL DEFAULT '[]'::jsonb
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("schema init failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for PostgresResourceStore {
    async fn register(&self, resource: &ResourceId) -> StoreResult<TrackedResource> {
        let result = sqlx::query(
            r#"
            INSERT INTO medledger_resources (resource_id, transaction_ids)
            VALUES ($1, '[]'::jsonb)
            ON CONFLICT (resource_id) DO NOTHING
            "#,
        )
        .bind(resource.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "resource {resource} is already tracked"
            )));
        }
        Ok(TrackedResource::new(resource.clone()))
    }

    async fn get(&self, resource: &ResourceId) -> StoreResult<Option<TrackedResource>> {
        let row = sqlx::query(
            r#"
            SELECT transaction_ids
              FROM medledger_resources
             WHERE resource_id = $1
            "#,
        )
        .bind(resource.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        row.map(|row| {
            let Json(references): Json<Vec<LedgerReference>> = row
                .try_get("transaction_ids")
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            Ok(TrackedResource {
                id: resource.clone(),
                references,
            })
        })
        .transpose()
    }

    async fn append_reference(
        &self,
        resource: &ResourceId,
        reference: LedgerReference,
    ) -> StoreResult<usize> {
        let row = sqlx::query(
            r#"
            UPDATE medledger_resources
               SET transaction_ids = transaction_ids || jsonb_build_array($2::text)
             WHERE resource_id = $1
         RETURNING jsonb_array_length(transaction_ids) AS len
            "#,
        )
        .bind(resource.as_str())
        .bind(reference.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
        .ok_or_else(|| StoreError::NotFound(resource.to_string()))?;

        let len: i32 = row
            .try_get("len")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        usize::try_from(len).map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn list(&self) -> StoreResult<Vec<ResourceId>> {
        let rows = sqlx::query("SELECT resource_id FROM medledger_resources ORDER BY resource_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>("resource_id")
                    .map(ResourceId::new)
                    .map_err(|e| StoreError::Backend(e.to_string()))
            })
            .collect()
    }
}
