use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use kommo_sync_core::config::AppConfig;
use serde::Serialize;
use toml::Value;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: String,
}

pub fn run() -> CommandResult {
    let config = match load_config() {
        Ok(config) => config,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("config", error_class, message, exit_code);
        }
    };

    let entries = entries(&config);
    CommandResult::success_with(
        "config",
        "effective config (source precedence: env > file > default)",
        entries,
    )
}

fn entries(config: &AppConfig) -> Vec<ConfigEntry> {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let entry = |key: &'static str, value: String, env_key: &str| ConfigEntry {
        key,
        value,
        source: field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref()),
    };

    vec![
        entry("database.url", config.database.url.clone(), "KOMMO_SYNC_DATABASE_URL"),
        entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            "KOMMO_SYNC_DATABASE_MAX_CONNECTIONS",
        ),
        entry(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "KOMMO_SYNC_DATABASE_TIMEOUT_SECS",
        ),
        entry(
            "kommo.base_url",
            config.kommo.base_url.clone().unwrap_or_else(|| "<derived from subdomain>".to_string()),
            "KOMMO_SYNC_KOMMO_BASE_URL",
        ),
        entry(
            "kommo.pipeline_id",
            config.kommo.pipeline_id.to_string(),
            "KOMMO_SYNC_KOMMO_PIPELINE_ID",
        ),
        entry(
            "kommo.request_timeout_secs",
            config.kommo.request_timeout_secs.to_string(),
            "KOMMO_SYNC_KOMMO_REQUEST_TIMEOUT_SECS",
        ),
        entry(
            "server.bind_address",
            config.server.bind_address.clone(),
            "KOMMO_SYNC_SERVER_BIND_ADDRESS",
        ),
        entry("server.port", config.server.port.to_string(), "KOMMO_SYNC_SERVER_PORT"),
        entry(
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            "KOMMO_SYNC_SERVER_HEALTH_CHECK_PORT",
        ),
        entry(
            "server.webhook_secret",
            if config.server.webhook_secret.is_some() { "<redacted>" } else { "<unset>" }
                .to_string(),
            "KOMMO_SYNC_SERVER_WEBHOOK_SECRET",
        ),
        entry("logging.level", config.logging.level.clone(), "KOMMO_SYNC_LOGGING_LEVEL"),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            "KOMMO_SYNC_LOGGING_FORMAT",
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("kommo-sync.toml"), PathBuf::from("config/kommo-sync.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::contains_path;

    #[test]
    fn nested_keys_are_found_in_toml_documents() {
        let doc: toml::Value = "[kommo]\npipeline_id = 42\n".parse().expect("toml");
        assert!(contains_path(&doc, "kommo.pipeline_id"));
        assert!(!contains_path(&doc, "kommo.base_url"));
        assert!(!contains_path(&doc, "server.port"));
    }
}
