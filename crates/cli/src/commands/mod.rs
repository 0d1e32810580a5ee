pub mod authorize;
pub mod config;
pub mod doctor;
pub mod fields;
pub mod migrate;
pub mod settings;
pub mod sync;
pub mod token;

use std::future::Future;

use kommo_sync_core::config::{AppConfig, LoadOptions};
use kommo_sync_db::{connect_with_config, migrations, DbPool};
use kommo_sync_kommo::{KommoError, KommoRuntime, TokenError};
use serde::Serialize;
use serde_json::Value;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATABASE: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_INVALID_INPUT: u8 = 6;
pub const EXIT_KOMMO: u8 = 7;
pub const EXIT_SYNC: u8 = 8;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// `(error_class, message, exit_code)` carried out of async command bodies.
pub(crate) type Failure = (&'static str, String, u8);

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: impl Serialize) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: serde_json::to_value(data).ok(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn from_failure(command: &str, (error_class, message, exit_code): Failure) -> Self {
        Self::failure(command, error_class, message, exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config() -> Result<AppConfig, Failure> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        ("config_validation", format!("configuration issue: {error}"), EXIT_CONFIG)
    })
}

pub(crate) fn block_on<T>(future: impl Future<Output = Result<T, Failure>>) -> Result<T, Failure> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| ("runtime_init", format!("failed to initialize async runtime: {error}"), EXIT_RUNTIME),
    )?;
    runtime.block_on(future)
}

pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
    Ok(pool)
}

/// Loads config, opens a migrated pool and hands a wired runtime to `work`.
pub(crate) fn with_runtime<F, Fut>(command: &str, work: F) -> CommandResult
where
    F: FnOnce(KommoRuntime) -> Fut,
    Fut: Future<Output = Result<CommandResult, Failure>>,
{
    let result = load_config().and_then(|config| block_on(run_session(config, work)));
    result.unwrap_or_else(|failure| CommandResult::from_failure(command, failure))
}

async fn run_session<F, Fut>(config: AppConfig, work: F) -> Result<CommandResult, Failure>
where
    F: FnOnce(KommoRuntime) -> Fut,
    Fut: Future<Output = Result<CommandResult, Failure>>,
{
    let pool = open_pool(&config).await?;
    let runtime = KommoRuntime::from_pool(&config.kommo, pool.clone())
        .map_err(|error| kommo_failure(&error))?;
    let result = work(runtime).await;
    pool.close().await;
    result
}

pub(crate) fn kommo_failure(error: &KommoError) -> Failure {
    (error.error_class(), error.to_string(), EXIT_KOMMO)
}

pub(crate) fn token_failure(error: TokenError) -> Failure {
    kommo_failure(&KommoError::from(error))
}

pub(crate) fn storage_failure(error: impl std::fmt::Display) -> Failure {
    ("persistence", error.to_string(), EXIT_DATABASE)
}
