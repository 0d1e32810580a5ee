use chrono::Utc;
use sqlx::Row;

use super::{RepositoryError, SettingsRepository};
use crate::DbPool;

pub struct SqlSettingsRepository {
    pool: DbPool,
}

impl SqlSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const UPSERT_SETTING: &str = r#"
    INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
"#;

#[async_trait::async_trait]
impl SettingsRepository for SqlSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        sqlx::query(UPSERT_SETTING)
            .bind(key)
            .bind(value)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM settings WHERE key = ?").bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn apply(&self, changes: &[(&str, Option<String>)]) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for (key, value) in changes {
            match value {
                Some(value) => {
                    sqlx::query(UPSERT_SETTING)
                        .bind(*key)
                        .bind(value)
                        .bind(&now)
                        .execute(&mut *tx)
                        .await?;
                }
                None => {
                    sqlx::query("DELETE FROM settings WHERE key = ?")
                        .bind(*key)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, String)>, RepositoryError> {
        let rows = sqlx::query("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| -> Result<(String, String), RepositoryError> {
                Ok((row.try_get("key")?, row.try_get("value")?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::SqlSettingsRepository;
    use crate::repositories::SettingsRepository;
    use crate::{connect_with_settings, migrations::run_pending};

    async fn repo() -> SqlSettingsRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlSettingsRepository::new(pool)
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let repo = repo().await;
        repo.set("kommo.subdomain", "first").await.expect("set");
        repo.set("kommo.subdomain", "second").await.expect("overwrite");

        assert_eq!(repo.get("kommo.subdomain").await.expect("get").as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn apply_sets_and_deletes_in_one_transaction() {
        let repo = repo().await;
        repo.set("b", "stale").await.expect("seed");

        repo.apply(&[("a", Some("1".to_owned())), ("b", None)]).await.expect("apply");

        assert_eq!(repo.list().await.expect("list"), vec![("a".to_owned(), "1".to_owned())]);
    }
}
