use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use kommo_sync_core::domain::affiliate::Referral;
use kommo_sync_core::domain::customer::{Customer, CustomerId};
use kommo_sync_core::domain::order::{Order, OrderId};

use super::{
    AffiliateRepository, CommerceRepository, OrderMetadataRepository, RepositoryError,
    SettingsRepository,
};

#[derive(Default)]
pub struct InMemorySettingsRepository {
    values: RwLock<BTreeMap<String, String>>,
}

#[async_trait::async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        self.values.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn apply(&self, changes: &[(&str, Option<String>)]) -> Result<(), RepositoryError> {
        let mut values = self.values.write().await;
        for (key, value) in changes {
            match value {
                Some(value) => values.insert((*key).to_string(), value.clone()),
                None => values.remove(*key),
            };
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, String)>, RepositoryError> {
        Ok(self.values.read().await.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

#[derive(Default)]
pub struct InMemoryOrderMetadataRepository {
    values: RwLock<HashMap<(i64, String), String>>,
}

#[async_trait::async_trait]
impl OrderMetadataRepository for InMemoryOrderMetadataRepository {
    async fn get(&self, order_id: OrderId, key: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self.values.read().await.get(&(order_id.0, key.to_string())).cloned())
    }

    async fn set(&self, order_id: OrderId, key: &str, value: &str) -> Result<(), RepositoryError> {
        self.values.write().await.insert((order_id.0, key.to_string()), value.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCommerceRepository {
    orders: RwLock<HashMap<i64, Order>>,
    customers: RwLock<HashMap<i64, Customer>>,
}

#[async_trait::async_trait]
impl CommerceRepository for InMemoryCommerceRepository {
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(&id.0).cloned())
    }

    async fn save_order(&self, order: &Order) -> Result<(), RepositoryError> {
        self.orders.write().await.insert(order.id.0, order.clone());
        Ok(())
    }

    async fn find_customer(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.customers.read().await.get(&id.0).cloned())
    }

    async fn save_customer(&self, customer: &Customer) -> Result<(), RepositoryError> {
        self.customers.write().await.insert(customer.id.0, customer.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAffiliateRepository {
    referrals: RwLock<Vec<Referral>>,
    affiliates: RwLock<HashMap<i64, String>>,
}

#[async_trait::async_trait]
impl AffiliateRepository for InMemoryAffiliateRepository {
    async fn find_referral_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Referral>, RepositoryError> {
        Ok(self.referrals.read().await.iter().find(|r| r.reference == reference).cloned())
    }

    async fn payment_email(&self, affiliate_id: i64) -> Result<Option<String>, RepositoryError> {
        Ok(self
            .affiliates
            .read()
            .await
            .get(&affiliate_id)
            .filter(|email| !email.trim().is_empty())
            .cloned())
    }

    async fn record_referral(&self, referral: &Referral) -> Result<(), RepositoryError> {
        let mut referrals = self.referrals.write().await;
        referrals.retain(|existing| existing.referral_id != referral.referral_id);
        referrals.push(referral.clone());
        Ok(())
    }

    async fn save_affiliate(
        &self,
        affiliate_id: i64,
        payment_email: &str,
    ) -> Result<(), RepositoryError> {
        self.affiliates.write().await.insert(affiliate_id, payment_email.to_string());
        Ok(())
    }
}
