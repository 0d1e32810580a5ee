pub mod client;
pub mod error;
pub mod oauth;
pub mod runtime;
pub mod sync;
pub mod token;

pub use client::{CustomFieldDefinition, Entity, KommoClient};
pub use error::{ExchangeError, KommoError, SyncError, TokenError};
pub use oauth::{Grant, OAuthClient, TokenExchanger};
pub use runtime::{http_client, KommoRuntime};
pub use sync::{SyncOutcome, SyncService, SyncStores};
pub use token::{BearerToken, TokenManager, TokenStatus};
