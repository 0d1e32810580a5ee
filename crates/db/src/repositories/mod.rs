use async_trait::async_trait;
use thiserror::Error;

use kommo_sync_core::domain::affiliate::{AffiliateAttribution, Referral};
use kommo_sync_core::domain::customer::{Customer, CustomerId};
use kommo_sync_core::domain::order::{Order, OrderId};

pub mod affiliate;
pub mod commerce;
pub mod credentials;
pub mod memory;
pub mod order_meta;
pub mod settings;

pub use affiliate::SqlAffiliateRepository;
pub use commerce::SqlCommerceRepository;
pub use credentials::{CredentialStore, CredentialsUpdate};
pub use memory::{
    InMemoryAffiliateRepository, InMemoryCommerceRepository, InMemoryOrderMetadataRepository,
    InMemorySettingsRepository,
};
pub use order_meta::{SqlOrderMetadataRepository, LEAD_ID_META_KEY};
pub use settings::SqlSettingsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Operator-entered key/value settings.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError>;
    async fn delete(&self, key: &str) -> Result<(), RepositoryError>;
    /// Applies all changes atomically. `None` deletes the key.
    async fn apply(&self, changes: &[(&str, Option<String>)]) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<(String, String)>, RepositoryError>;
}

#[async_trait]
pub trait OrderMetadataRepository: Send + Sync {
    async fn get(&self, order_id: OrderId, key: &str) -> Result<Option<String>, RepositoryError>;
    async fn set(&self, order_id: OrderId, key: &str, value: &str) -> Result<(), RepositoryError>;
}

/// Read side of the e-commerce store, fed by ingress snapshots.
#[async_trait]
pub trait CommerceRepository: Send + Sync {
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;
    async fn save_order(&self, order: &Order) -> Result<(), RepositoryError>;
    async fn find_customer(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError>;
    async fn save_customer(&self, customer: &Customer) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AffiliateRepository: Send + Sync {
    /// First referral recorded against `reference` (the order id).
    async fn find_referral_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Referral>, RepositoryError>;
    async fn payment_email(&self, affiliate_id: i64) -> Result<Option<String>, RepositoryError>;
    async fn record_referral(&self, referral: &Referral) -> Result<(), RepositoryError>;
    async fn save_affiliate(
        &self,
        affiliate_id: i64,
        payment_email: &str,
    ) -> Result<(), RepositoryError>;

    async fn attribution_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<AffiliateAttribution, RepositoryError> {
        let Some(referral) = self.find_referral_by_reference(&order_id.to_string()).await? else {
            return Ok(AffiliateAttribution::default());
        };

        let affiliate_of = if referral.affiliate_id > 0 {
            self.payment_email(referral.affiliate_id).await?
        } else {
            None
        };

        Ok(AffiliateAttribution::new(Some(referral.referral_id), affiliate_of))
    }
}
