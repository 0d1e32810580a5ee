use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Static OAuth client registration for one Kommo account.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub subdomain: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
}

impl Credentials {
    pub fn api_base_url(&self) -> String {
        format!("https://{}.kommo.com", self.subdomain.trim())
    }
}

/// Token pair returned by a successful grant exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Persisted token state. An access token without `expires_at` violates the
/// invariant and is never considered usable.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Unix seconds.
    pub expires_at: Option<i64>,
}

impl std::fmt::Debug for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("TokenState")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl TokenState {
    pub fn issued(pair: TokenPair, now: i64) -> Self {
        Self {
            access_token: Some(pair.access_token),
            refresh_token: Some(pair.refresh_token),
            expires_at: Some(now.saturating_add(pair.expires_in)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.expires_at.is_none()
    }

    /// Access token usable at `now`. Expired exactly at `expires_at`.
    pub fn usable_access_token(&self, now: i64) -> Option<&str> {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(expires_at)) if now < expires_at && !token.is_empty() => {
                Some(token.as_str())
            }
            _ => None,
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|token| !token.is_empty())
    }
}
