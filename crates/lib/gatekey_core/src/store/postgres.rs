//! PostgreSQL store backend.
//!
//! Documents live in a single `documents` table keyed by (tbl, pk, sk), with
//! the payload as `jsonb`. Every trait method is exactly one SQL statement;
//! per-statement atomicity is what upholds the store's per-key contract, and
//! the conditional merge in `update_if` rides on `UPDATE ... WHERE` row
//! matching instead of any explicit locking.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPool;

use super::{Item, Key, KeyValueStore, StoreError};

/// `sqlx`-backed [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl PostgresStore {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the given database URL.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(url).await?;
        Ok(Self { pool })
    }

    /// Create the backing table and the account-id expression index used by
    /// `query_index`. Idempotent.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                 tbl  text NOT NULL,
                 pk   text NOT NULL,
                 sk   text NOT NULL DEFAULT '',
                 item jsonb NOT NULL,
                 PRIMARY KEY (tbl, pk, sk)
             )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS documents_account_idx
                 ON documents (tbl, (item->>'accountId'))",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn to_value(item: Item) -> Value {
        Value::Object(item)
    }

    fn to_item(value: Value) -> Result<Item, StoreError> {
        match value {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Backend(format!(
                "non-object document in store: {other}"
            ))),
        }
    }
}

#[async_trait]
impl KeyValueStore for PostgresStore {
    async fn get(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query_scalar::<_, Value>(
            "SELECT item FROM documents WHERE tbl = $1 AND pk = $2 AND sk = $3",
        )
        .bind(table)
        .bind(key.pk())
        .bind(key.sk())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::to_item).transpose()
    }

    async fn put(&self, table: &str, key: &Key, item: Item) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO documents (tbl, pk, sk, item) VALUES ($1, $2, $3, $4)
             ON CONFLICT (tbl, pk, sk) DO UPDATE SET item = EXCLUDED.item",
        )
        .bind(table)
        .bind(key.pk())
        .bind(key.sk())
        .bind(Self::to_value(item))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, table: &str, key: &Key, patch: Item) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE documents SET item = item || $4
             WHERE tbl = $1 AND pk = $2 AND sk = $3",
        )
        .bind(table)
        .bind(key.pk())
        .bind(key.sk())
        .bind(Self::to_value(patch))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_if(
        &self,
        table: &str,
        key: &Key,
        guard_field: &str,
        guard_value: &Value,
        patch: Item,
    ) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query_scalar::<_, Value>(
            "UPDATE documents SET item = item || $6
             WHERE tbl = $1 AND pk = $2 AND sk = $3 AND item->$4 = $5
             RETURNING item",
        )
        .bind(table)
        .bind(key.pk())
        .bind(key.sk())
        .bind(guard_field)
        .bind(guard_value)
        .bind(Self::to_value(patch))
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::to_item).transpose()
    }

    async fn delete(&self, table: &str, key: &Key) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM documents WHERE tbl = $1 AND pk = $2 AND sk = $3")
                .bind(table)
                .bind(key.pk())
                .bind(key.sk())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query_index(
        &self,
        table: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query_scalar::<_, Value>(
            "SELECT item FROM documents WHERE tbl = $1 AND item->>$2 = $3",
        )
        .bind(table)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::to_item).collect()
    }
}
