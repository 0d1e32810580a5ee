use std::collections::BTreeMap;

use kommo_sync_db::repositories::credentials::keys;
use kommo_sync_db::repositories::CredentialsUpdate;
use secrecy::SecretString;
use serde::Serialize;

use crate::commands::{storage_failure, with_runtime, CommandResult, Failure, EXIT_INVALID_INPUT};

const REDACTED: &str = "<redacted>";

/// Flags accepted by `settings set`. Empty strings are ignored.
#[derive(Clone, Debug, Default)]
pub struct SettingsInput {
    pub subdomain: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub auth_code: Option<String>,
}

impl SettingsInput {
    fn into_update(self) -> (CredentialsUpdate, Vec<&'static str>) {
        let present =
            |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let update = CredentialsUpdate {
            subdomain: present(self.subdomain),
            client_id: present(self.client_id),
            client_secret: present(self.client_secret).map(SecretString::from),
            redirect_uri: present(self.redirect_uri),
            authorization_code: present(self.auth_code).map(SecretString::from),
        };

        let mut touched = Vec::new();
        if update.subdomain.is_some() {
            touched.push(keys::SUBDOMAIN);
        }
        if update.client_id.is_some() {
            touched.push(keys::CLIENT_ID);
        }
        if update.client_secret.is_some() {
            touched.push(keys::CLIENT_SECRET);
        }
        if update.redirect_uri.is_some() {
            touched.push(keys::REDIRECT_URI);
        }
        if update.authorization_code.is_some() {
            touched.push(keys::AUTHORIZATION_CODE);
        }
        (update, touched)
    }
}

#[derive(Debug, Serialize)]
struct SettingsUpdated {
    updated: Vec<&'static str>,
    missing: Vec<&'static str>,
}

pub fn show() -> CommandResult {
    with_runtime("settings-show", |runtime| async move {
        let stored = runtime.credentials.settings().list().await.map_err(storage_failure)?;
        let settings: BTreeMap<String, String> = stored
            .into_iter()
            .map(|(key, value)| {
                let shown = if keys::SECRETS.contains(&key.as_str()) { REDACTED.to_string() } else { value };
                (key, shown)
            })
            .collect();

        let message = format!("{} stored settings", settings.len());
        Ok::<_, Failure>(CommandResult::success_with("settings-show", message, settings))
    })
}

/// Writes the given credentials; unspecified keys and stored tokens are untouched.
pub fn set(input: SettingsInput) -> CommandResult {
    let (update, updated) = input.into_update();
    if update.is_empty() {
        return CommandResult::failure(
            "settings-set",
            "invalid_input",
            "pass at least one of --subdomain, --client-id, --client-secret, --redirect-uri, --auth-code",
            EXIT_INVALID_INPUT,
        );
    }

    with_runtime("settings-set", |runtime| async move {
        runtime.credentials.update(&update).await.map_err(storage_failure)?;
        let missing = runtime.credentials.missing_credential_keys().await.map_err(storage_failure)?;

        let message = format!("updated {} settings", updated.len());
        Ok::<_, Failure>(CommandResult::success_with(
            "settings-set",
            message,
            SettingsUpdated { updated, missing },
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::SettingsInput;

    #[test]
    fn blank_flags_are_not_applied() {
        let (update, touched) = SettingsInput {
            subdomain: Some("  shop ".to_string()),
            client_id: Some("   ".to_string()),
            ..SettingsInput::default()
        }
        .into_update();

        assert_eq!(update.subdomain.as_deref(), Some("shop"));
        assert!(update.client_id.is_none());
        assert_eq!(touched, vec!["kommo.subdomain"]);
    }
}
