use std::sync::Arc;
use std::time::Duration;

use kommo_sync_core::config::KommoConfig;
use kommo_sync_db::repositories::{
    SqlAffiliateRepository, SqlCommerceRepository, SqlOrderMetadataRepository,
    SqlSettingsRepository,
};
use kommo_sync_db::{AffiliateRepository, CommerceRepository, CredentialStore, DbPool};

use crate::client::KommoClient;
use crate::error::KommoError;
use crate::oauth::OAuthClient;
use crate::sync::{SyncService, SyncStores};
use crate::token::TokenManager;

/// Everything the binaries need, wired over one SQLite pool.
#[derive(Clone)]
pub struct KommoRuntime {
    pub credentials: CredentialStore,
    pub tokens: Arc<TokenManager>,
    pub client: KommoClient,
    pub sync: Arc<SyncService>,
    pub commerce: Arc<dyn CommerceRepository>,
    pub affiliates: Arc<dyn AffiliateRepository>,
}

pub fn http_client(request_timeout_secs: u64) -> Result<reqwest::Client, KommoError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(request_timeout_secs.max(1)))
        .user_agent(concat!("kommo-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|error| KommoError::Transport(error.to_string()))
}

impl KommoRuntime {
    pub fn from_pool(config: &KommoConfig, pool: DbPool) -> Result<Self, KommoError> {
        let http = http_client(config.request_timeout_secs)?;
        let credentials = CredentialStore::new(Arc::new(SqlSettingsRepository::new(pool.clone())));
        let tokens = Arc::new(TokenManager::new(
            credentials.clone(),
            Arc::new(OAuthClient::new(http.clone())),
            config.base_url.clone(),
        ));
        let client = KommoClient::new(http, tokens.clone());

        let commerce: Arc<dyn CommerceRepository> = Arc::new(SqlCommerceRepository::new(pool.clone()));
        let affiliates: Arc<dyn AffiliateRepository> =
            Arc::new(SqlAffiliateRepository::new(pool.clone()));
        let stores = SyncStores {
            commerce: commerce.clone(),
            affiliates: affiliates.clone(),
            order_meta: Arc::new(SqlOrderMetadataRepository::new(pool)),
        };
        let sync = Arc::new(SyncService::new(client.clone(), stores, config.pipeline_id));

        Ok(Self { credentials, tokens, client, sync, commerce, affiliates })
    }
}
