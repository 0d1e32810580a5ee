use kommo_sync_core::config::AppConfig;
use kommo_sync_db::{connect_with_config, migrations, DbPool};
use kommo_sync_kommo::{KommoError, KommoRuntime};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: KommoRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("kommo client setup failed: {0}")]
    Kommo(#[from] KommoError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let runtime = KommoRuntime::from_pool(&config.kommo, db_pool.clone())?;
    let missing = runtime.credentials.missing_credential_keys().await.unwrap_or_default();
    if !missing.is_empty() {
        tracing::warn!(
            event_name = "system.bootstrap.kommo_unconfigured",
            correlation_id = "bootstrap",
            missing = ?missing,
            "kommo credentials incomplete; events will be stored but not synced"
        );
    }

    Ok(Application { config, db_pool, runtime })
}
