use chrono::Utc;
use serde::de::DeserializeOwned;

use kommo_sync_core::domain::customer::{Customer, CustomerId};
use kommo_sync_core::domain::order::{Order, OrderId};

use super::{CommerceRepository, RepositoryError};
use crate::DbPool;

/// Stores the latest order and customer snapshot delivered by the store as
/// JSON, keyed by the store's numeric id.
pub struct SqlCommerceRepository {
    pool: DbPool,
}

impl SqlCommerceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T: DeserializeOwned>(payload: Option<String>) -> Result<Option<T>, RepositoryError> {
    payload
        .map(|json| {
            serde_json::from_str(&json).map_err(|error| RepositoryError::Decode(error.to_string()))
        })
        .transpose()
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error| RepositoryError::Decode(error.to_string()))
}

#[async_trait::async_trait]
impl CommerceRepository for SqlCommerceRepository {
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let payload = sqlx::query_scalar::<_, String>(
            "SELECT payload_json FROM commerce_order WHERE order_id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        decode(payload)
    }

    async fn save_order(&self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO commerce_order (order_id, customer_id, payload_json, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(order_id) DO UPDATE SET
                customer_id = excluded.customer_id,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(order.id.0)
        .bind(order.customer_id.map(|id| id.0))
        .bind(encode(order)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_customer(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let payload = sqlx::query_scalar::<_, String>(
            "SELECT payload_json FROM commerce_customer WHERE customer_id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        decode(payload)
    }

    async fn save_customer(&self, customer: &Customer) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO commerce_customer (customer_id, email, payload_json, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(customer_id) DO UPDATE SET
                email = excluded.email,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(customer.id.0)
        .bind(&customer.email)
        .bind(encode(customer)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
