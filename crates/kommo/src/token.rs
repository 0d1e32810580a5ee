//! OAuth token lifecycle.
//!
//! [`TokenManager::get_access_token`] walks the phases from
//! [`kommo_sync_core::auth`] until it holds a usable bearer token or runs out
//! of grants. A failed refresh wipes the stored pair so the next phase is
//! decided from the authorization code alone.

use std::sync::Arc;

use chrono::Utc;
use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use kommo_sync_core::auth::{self, TokenPhase};
use kommo_sync_core::domain::credentials::{Credentials, TokenState};
use kommo_sync_db::repositories::{CredentialStore, CredentialsUpdate};

use crate::error::TokenError;
use crate::oauth::{Grant, TokenExchanger};

/// Usable access token plus the API base it was issued for.
#[derive(Clone)]
pub struct BearerToken {
    pub access_token: String,
    pub base_url: String,
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("access_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Offline snapshot of the stored token state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenStatus {
    pub phase: TokenPhase,
    pub expires_at: Option<i64>,
    pub has_refresh_token: bool,
    pub has_authorization_code: bool,
    pub missing_settings: Vec<&'static str>,
}

pub struct TokenManager {
    store: CredentialStore,
    exchanger: Arc<dyn TokenExchanger>,
    base_url_override: Option<String>,
    acquisition: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        store: CredentialStore,
        exchanger: Arc<dyn TokenExchanger>,
        base_url_override: Option<String>,
    ) -> Self {
        Self { store, exchanger, base_url_override, acquisition: Mutex::new(()) }
    }

    /// Returns a usable bearer token. Failures are logged here; callers only
    /// need to propagate them.
    pub async fn get_access_token(&self) -> Result<BearerToken, TokenError> {
        let _guard = self.acquisition.lock().await;
        let result = self.acquire().await;
        if let Err(error) = &result {
            warn!(event_name = "kommo.token.unavailable", error = %error, "no kommo access token");
        }
        result
    }

    /// Stores `code` when given, then mints a token pair from the stored
    /// authorization code regardless of the current token state.
    pub async fn authorize(&self, code: Option<SecretString>) -> Result<TokenState, TokenError> {
        let _guard = self.acquisition.lock().await;
        if let Some(code) = code {
            self.store
                .update(&CredentialsUpdate { authorization_code: Some(code), ..Default::default() })
                .await?;
        }

        let code = self.store.authorization_code().await?.ok_or(TokenError::NoCredentials)?;
        let credentials = self.credentials().await?;
        let base_url = self.base_url(&credentials);
        self.exchange_code(&credentials, &base_url, code).await?;
        Ok(self.store.load_token_state().await?)
    }

    pub async fn status(&self) -> Result<TokenStatus, TokenError> {
        let state = self.store.load_token_state().await?;
        let has_authorization_code = self.store.authorization_code().await?.is_some();
        Ok(TokenStatus {
            phase: auth::evaluate(&state, has_authorization_code, Utc::now().timestamp()),
            expires_at: state.expires_at,
            has_refresh_token: state.refresh_token().is_some(),
            has_authorization_code,
            missing_settings: self.store.missing_credential_keys().await?,
        })
    }

    async fn acquire(&self) -> Result<BearerToken, TokenError> {
        let has_code = self.store.authorization_code().await?.is_some();
        let mut state = self.store.load_token_state().await?;

        loop {
            let now = Utc::now().timestamp();
            let phase = auth::evaluate(&state, has_code, now);
            debug!(event_name = "kommo.token.phase", phase = phase.as_str(), "evaluated token state");

            match phase {
                TokenPhase::Valid => {
                    let access_token = state.usable_access_token(now).unwrap_or_default().to_string();
                    let base_url = match &self.base_url_override {
                        Some(base_url) => base_url.clone(),
                        None => self.credentials().await?.api_base_url(),
                    };
                    return Ok(BearerToken { access_token, base_url });
                }
                TokenPhase::NeedsRefresh => {
                    let credentials = self.credentials().await?;
                    let base_url = self.base_url(&credentials);
                    let refresh_token = SecretString::from(state.refresh_token().unwrap_or_default());

                    match self
                        .exchanger
                        .exchange(&base_url, &credentials, &Grant::RefreshToken(refresh_token))
                        .await
                    {
                        Ok(pair) => {
                            let refreshed = TokenState::issued(pair, Utc::now().timestamp());
                            self.store.save_token_state(&refreshed).await?;
                            info!(
                                event_name = "kommo.token.refreshed",
                                expires_at = refreshed.expires_at,
                                "kommo access token refreshed"
                            );
                            return Ok(bearer(&refreshed, base_url));
                        }
                        Err(error) => {
                            warn!(
                                event_name = "kommo.token.refresh_failed",
                                error = %error,
                                "refresh rejected, clearing stored tokens"
                            );
                            self.store.clear_tokens().await?;
                            state = TokenState::default();
                        }
                    }
                }
                TokenPhase::NeedsReauthorization => {
                    let code =
                        self.store.authorization_code().await?.ok_or(TokenError::NoCredentials)?;
                    let credentials = self.credentials().await?;
                    let base_url = self.base_url(&credentials);
                    let issued = self.exchange_code(&credentials, &base_url, code).await?;
                    return Ok(bearer(&issued, base_url));
                }
                TokenPhase::Unauthenticated => return Err(TokenError::NoCredentials),
            }
        }
    }

    async fn exchange_code(
        &self,
        credentials: &Credentials,
        base_url: &str,
        code: SecretString,
    ) -> Result<TokenState, TokenError> {
        let pair = self
            .exchanger
            .exchange(base_url, credentials, &Grant::AuthorizationCode(code))
            .await
            .map_err(TokenError::AuthorizationFailed)?;
        let issued = TokenState::issued(pair, Utc::now().timestamp());
        self.store.save_token_state(&issued).await?;
        info!(
            event_name = "kommo.token.authorized",
            expires_at = issued.expires_at,
            "kommo authorization code exchanged"
        );
        Ok(issued)
    }

    async fn credentials(&self) -> Result<Credentials, TokenError> {
        match self.store.load_credentials().await? {
            Some(credentials) => Ok(credentials),
            None => Err(TokenError::NotConfigured {
                missing: self.store.missing_credential_keys().await?,
            }),
        }
    }

    fn base_url(&self, credentials: &Credentials) -> String {
        self.base_url_override.clone().unwrap_or_else(|| credentials.api_base_url())
    }
}

fn bearer(state: &TokenState, base_url: String) -> BearerToken {
    BearerToken { access_token: state.access_token.clone().unwrap_or_default(), base_url }
}
