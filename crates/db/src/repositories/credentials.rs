use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use kommo_sync_core::domain::credentials::{Credentials, TokenState};

use super::{RepositoryError, SettingsRepository};

pub mod keys {
    pub const SUBDOMAIN: &str = "kommo.subdomain";
    pub const CLIENT_ID: &str = "kommo.client_id";
    pub const CLIENT_SECRET: &str = "kommo.client_secret";
    pub const REDIRECT_URI: &str = "kommo.redirect_uri";
    pub const AUTHORIZATION_CODE: &str = "kommo.authorization_code";
    pub const ACCESS_TOKEN: &str = "kommo.access_token";
    pub const REFRESH_TOKEN: &str = "kommo.refresh_token";
    pub const TOKEN_EXPIRES: &str = "kommo.token_expires";

    pub const CREDENTIALS: [&str; 4] = [SUBDOMAIN, CLIENT_ID, CLIENT_SECRET, REDIRECT_URI];

    /// Keys whose values are never printed.
    pub const SECRETS: [&str; 4] = [CLIENT_SECRET, AUTHORIZATION_CODE, ACCESS_TOKEN, REFRESH_TOKEN];
}

/// Operator-supplied changes. Fields left as `None` keep their stored value.
#[derive(Clone, Debug, Default)]
pub struct CredentialsUpdate {
    pub subdomain: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub redirect_uri: Option<String>,
    pub authorization_code: Option<SecretString>,
}

impl CredentialsUpdate {
    pub fn is_empty(&self) -> bool {
        self.subdomain.is_none()
            && self.client_id.is_none()
            && self.client_secret.is_none()
            && self.redirect_uri.is_none()
            && self.authorization_code.is_none()
    }
}

/// Typed view over the settings store for OAuth credentials and token state.
#[derive(Clone)]
pub struct CredentialStore {
    settings: Arc<dyn SettingsRepository>,
}

impl CredentialStore {
    pub fn new(settings: Arc<dyn SettingsRepository>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Arc<dyn SettingsRepository> {
        &self.settings
    }

    async fn non_empty(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self.settings.get(key).await?.filter(|value| !value.trim().is_empty()))
    }

    /// `None` until every credential key has a value.
    pub async fn load_credentials(&self) -> Result<Option<Credentials>, RepositoryError> {
        let (Some(subdomain), Some(client_id), Some(client_secret), Some(redirect_uri)) = (
            self.non_empty(keys::SUBDOMAIN).await?,
            self.non_empty(keys::CLIENT_ID).await?,
            self.non_empty(keys::CLIENT_SECRET).await?,
            self.non_empty(keys::REDIRECT_URI).await?,
        ) else {
            return Ok(None);
        };

        Ok(Some(Credentials {
            subdomain,
            client_id,
            client_secret: SecretString::from(client_secret),
            redirect_uri,
        }))
    }

    pub async fn missing_credential_keys(&self) -> Result<Vec<&'static str>, RepositoryError> {
        let mut missing = Vec::new();
        for key in keys::CREDENTIALS {
            if self.non_empty(key).await?.is_none() {
                missing.push(key);
            }
        }
        Ok(missing)
    }

    pub async fn update(&self, update: &CredentialsUpdate) -> Result<(), RepositoryError> {
        let mut changes: Vec<(&str, Option<String>)> = Vec::new();
        let mut push = |key, value: Option<String>| {
            if let Some(value) = value {
                changes.push((key, Some(value.trim().to_string())));
            }
        };
        push(keys::SUBDOMAIN, update.subdomain.clone());
        push(keys::CLIENT_ID, update.client_id.clone());
        push(
            keys::CLIENT_SECRET,
            update.client_secret.as_ref().map(|secret| secret.expose_secret().to_string()),
        );
        push(keys::REDIRECT_URI, update.redirect_uri.clone());
        push(
            keys::AUTHORIZATION_CODE,
            update.authorization_code.as_ref().map(|code| code.expose_secret().to_string()),
        );

        if changes.is_empty() {
            return Ok(());
        }
        self.settings.apply(&changes).await
    }

    pub async fn authorization_code(&self) -> Result<Option<SecretString>, RepositoryError> {
        Ok(self.non_empty(keys::AUTHORIZATION_CODE).await?.map(SecretString::from))
    }

    /// Reads token state. An unparsable expiry is dropped, which leaves the
    /// access token unusable.
    pub async fn load_token_state(&self) -> Result<TokenState, RepositoryError> {
        let expires_at = self
            .non_empty(keys::TOKEN_EXPIRES)
            .await?
            .and_then(|raw| raw.trim().parse::<i64>().ok());

        Ok(TokenState {
            access_token: self.non_empty(keys::ACCESS_TOKEN).await?,
            refresh_token: self.non_empty(keys::REFRESH_TOKEN).await?,
            expires_at,
        })
    }

    pub async fn save_token_state(&self, state: &TokenState) -> Result<(), RepositoryError> {
        self.settings
            .apply(&[
                (keys::ACCESS_TOKEN, state.access_token.clone()),
                (keys::REFRESH_TOKEN, state.refresh_token.clone()),
                (keys::TOKEN_EXPIRES, state.expires_at.map(|value| value.to_string())),
            ])
            .await
    }

    pub async fn clear_tokens(&self) -> Result<(), RepositoryError> {
        self.save_token_state(&TokenState::default()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kommo_sync_core::domain::credentials::TokenState;
    use secrecy::{ExposeSecret, SecretString};

    use super::{keys, CredentialStore, CredentialsUpdate};
    use crate::repositories::{InMemorySettingsRepository, SettingsRepository};

    fn store() -> (CredentialStore, Arc<InMemorySettingsRepository>) {
        let settings = Arc::new(InMemorySettingsRepository::default());
        (CredentialStore::new(settings.clone()), settings)
    }

    #[tokio::test]
    async fn credentials_require_every_key() {
        let (store, _) = store();
        store
            .update(&CredentialsUpdate {
                subdomain: Some("shop".to_owned()),
                client_id: Some("client".to_owned()),
                ..CredentialsUpdate::default()
            })
            .await
            .expect("partial update");

        assert!(store.load_credentials().await.expect("load").is_none());
        assert_eq!(
            store.missing_credential_keys().await.expect("missing"),
            vec![keys::CLIENT_SECRET, keys::REDIRECT_URI]
        );

        store
            .update(&CredentialsUpdate {
                client_secret: Some(SecretString::from("s3cret")),
                redirect_uri: Some("https://shop.example/cb".to_owned()),
                ..CredentialsUpdate::default()
            })
            .await
            .expect("complete update");

        let credentials = store.load_credentials().await.expect("load").expect("complete");
        assert_eq!(credentials.subdomain, "shop");
        assert_eq!(credentials.client_secret.expose_secret(), "s3cret");
    }

    #[tokio::test]
    async fn token_state_round_trips_and_clears() {
        let (store, settings) = store();
        let state = TokenState {
            access_token: Some("access".to_owned()),
            refresh_token: Some("refresh".to_owned()),
            expires_at: Some(1_700_000_000),
        };
        store.save_token_state(&state).await.expect("save");
        assert_eq!(store.load_token_state().await.expect("load"), state);

        store.clear_tokens().await.expect("clear");
        assert!(store.load_token_state().await.expect("load").is_empty());
        assert_eq!(settings.get(keys::TOKEN_EXPIRES).await.expect("get"), None);
    }

    #[tokio::test]
    async fn unparsable_expiry_is_dropped() {
        let (store, settings) = store();
        settings.set(keys::ACCESS_TOKEN, "access").await.expect("set");
        settings.set(keys::TOKEN_EXPIRES, "tomorrow").await.expect("set");

        let state = store.load_token_state().await.expect("load");
        assert_eq!(state.expires_at, None);
        assert_eq!(state.usable_access_token(0), None);
    }
}
