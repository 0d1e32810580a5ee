use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use kommo_sync_core::domain::credentials::{Credentials, TokenPair};

use crate::error::{truncate_body, ExchangeError};

pub const TOKEN_PATH: &str = "/oauth2/access_token";

#[derive(Clone, Debug)]
pub enum Grant {
    RefreshToken(SecretString),
    AuthorizationCode(SecretString),
}

impl Grant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::RefreshToken(_) => "refresh_token",
            Self::AuthorizationCode(_) => "authorization_code",
        }
    }
}

/// Exchanges a grant for a fresh token pair.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(
        &self,
        base_url: &str,
        credentials: &Credentials,
        grant: &Grant,
    ) -> Result<TokenPair, ExchangeError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_pair(self) -> Result<TokenPair, ExchangeError> {
        let missing = [
            ("access_token", self.access_token.as_deref().map_or(true, str::is_empty)),
            ("refresh_token", self.refresh_token.as_deref().map_or(true, str::is_empty)),
            ("expires_in", self.expires_in.map_or(true, |seconds| seconds <= 0)),
        ]
        .into_iter()
        .filter_map(|(field, absent)| absent.then_some(field))
        .collect::<Vec<_>>();

        match (self.access_token, self.refresh_token, self.expires_in) {
            (Some(access_token), Some(refresh_token), Some(expires_in)) if missing.is_empty() => {
                Ok(TokenPair { access_token, refresh_token, expires_in })
            }
            _ => Err(ExchangeError::MalformedResponse(format!(
                "missing or empty {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Kommo OAuth2 token endpoint client.
#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
}

impl OAuthClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl TokenExchanger for OAuthClient {
    async fn exchange(
        &self,
        base_url: &str,
        credentials: &Credentials,
        grant: &Grant,
    ) -> Result<TokenPair, ExchangeError> {
        let mut body = json!({
            "client_id": credentials.client_id,
            "client_secret": credentials.client_secret.expose_secret(),
            "grant_type": grant.grant_type(),
            "redirect_uri": credentials.redirect_uri,
        });
        match grant {
            Grant::RefreshToken(token) => {
                body["refresh_token"] = json!(token.expose_secret());
            }
            Grant::AuthorizationCode(code) => {
                body["code"] = json!(code.expose_secret());
            }
        }

        debug!(
            event_name = "kommo.oauth.exchange_started",
            grant_type = grant.grant_type(),
            "requesting kommo token"
        );

        let url = format!("{}{}", base_url.trim_end_matches('/'), TOKEN_PATH);
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|error| ExchangeError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Http { status: status.as_u16(), body: truncate_body(body) });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|error| ExchangeError::MalformedResponse(error.to_string()))?;
        token.into_pair()
    }
}
