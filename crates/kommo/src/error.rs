use thiserror::Error;

use kommo_sync_core::errors::DomainError;
use kommo_sync_db::RepositoryError;

/// Failure talking to the OAuth token endpoint.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("token endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("token request failed: {0}")]
    Transport(String),
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no credentials available, operator must re-authorize")]
    NoCredentials,
    #[error("kommo client is not configured, missing settings: {}", .missing.join(", "))]
    NotConfigured { missing: Vec<&'static str> },
    #[error("authorization code exchange failed: {0}")]
    AuthorizationFailed(#[source] ExchangeError),
    #[error("credential store failure: {0}")]
    Storage(#[from] RepositoryError),
}

#[derive(Debug, Error)]
pub enum KommoError {
    #[error("no access token available: {0}")]
    NoToken(#[from] TokenError),
    #[error("kommo returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("kommo request failed: {0}")]
    Transport(String),
    #[error("malformed kommo response: {0}")]
    MalformedResponse(String),
}

impl KommoError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::NoToken(TokenError::Storage(_)) => "persistence",
            Self::NoToken(_) => "no-token-available",
            Self::Http { .. } | Self::Transport(_) => "http-error",
            Self::MalformedResponse(_) => "malformed-response",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
    #[error(transparent)]
    Kommo(#[from] KommoError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

impl SyncError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not-found",
            Self::Kommo(error) => error.error_class(),
            Self::Domain(error) => error.error_class(),
            Self::Persistence(_) => "persistence",
        }
    }
}

/// Response bodies are echoed into errors and logs; keep them short.
pub(crate) fn truncate_body(body: String) -> String {
    const LIMIT: usize = 512;
    if body.len() <= LIMIT {
        return body;
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
