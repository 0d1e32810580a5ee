use chrono::Utc;

use kommo_sync_core::domain::order::OrderId;

use super::{OrderMetadataRepository, RepositoryError};
use crate::DbPool;

/// Metadata key holding the Kommo lead id created for an order.
pub const LEAD_ID_META_KEY: &str = "lead_id";

pub struct SqlOrderMetadataRepository {
    pool: DbPool,
}

impl SqlOrderMetadataRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrderMetadataRepository for SqlOrderMetadataRepository {
    async fn get(&self, order_id: OrderId, key: &str) -> Result<Option<String>, RepositoryError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT meta_value FROM order_meta WHERE order_id = ? AND meta_key = ?",
        )
        .bind(order_id.0)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set(&self, order_id: OrderId, key: &str, value: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO order_meta (order_id, meta_key, meta_value, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(order_id, meta_key) DO UPDATE SET
                meta_value = excluded.meta_value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(order_id.0)
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
