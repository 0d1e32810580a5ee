//! Event handlers tying store events to Kommo contacts and leads.
//!
//! Each `handle_*` entry point folds every failure into a [`SyncOutcome`];
//! nothing propagates back to the event source.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use kommo_sync_core::domain::crm::{ContactId, LeadId, LeadRef};
use kommo_sync_core::domain::customer::{Customer, CustomerId};
use kommo_sync_core::domain::order::{Order, OrderId, OrderStatus};
use kommo_sync_core::errors::DomainError;
use kommo_sync_core::flows::{LeadSyncAction, LeadSyncEvent, LeadSyncFlow, LeadSyncState};
use kommo_sync_core::mapping;
use kommo_sync_core::AffiliateAttribution;
use kommo_sync_db::repositories::LEAD_ID_META_KEY;
use kommo_sync_db::{AffiliateRepository, CommerceRepository, OrderMetadataRepository};

use crate::client::KommoClient;
use crate::error::SyncError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced {
        #[serde(skip_serializing_if = "Option::is_none")]
        contact_id: Option<ContactId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lead_id: Option<LeadId>,
    },
    Skipped {
        reason: &'static str,
    },
    Failed {
        error_class: &'static str,
        message: String,
    },
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }

    fn failed(error: &SyncError) -> Self {
        Self::Failed { error_class: error.error_class(), message: error.to_string() }
    }
}

#[derive(Clone)]
pub struct SyncStores {
    pub commerce: Arc<dyn CommerceRepository>,
    pub affiliates: Arc<dyn AffiliateRepository>,
    pub order_meta: Arc<dyn OrderMetadataRepository>,
}

pub struct SyncService {
    client: KommoClient,
    stores: SyncStores,
    pipeline_id: i64,
    flow: LeadSyncFlow,
    leads: Mutex<()>,
}

impl SyncService {
    pub fn new(client: KommoClient, stores: SyncStores, pipeline_id: i64) -> Self {
        Self { client, stores, pipeline_id, flow: LeadSyncFlow, leads: Mutex::new(()) }
    }

    pub async fn handle_new_customer(&self, customer_id: CustomerId) -> SyncOutcome {
        self.customer_outcome("customer_created", customer_id).await
    }

    pub async fn handle_customer_update(&self, customer_id: CustomerId) -> SyncOutcome {
        self.customer_outcome("customer_updated", customer_id).await
    }

    pub async fn handle_new_order(&self, order_id: OrderId) -> SyncOutcome {
        let result = self.sync_order(order_id).await;
        self.finish("order_created", &order_id.to_string(), result)
    }

    pub async fn handle_order_status_change(
        &self,
        order_id: OrderId,
        old_status: OrderStatus,
        new_status: OrderStatus,
    ) -> SyncOutcome {
        let result = self
            .update_lead_status(order_id, old_status, new_status)
            .await
            .map(|lead| SyncOutcome::Synced { contact_id: None, lead_id: Some(lead.lead_id) });

        self.finish("order_status_changed", &order_id.to_string(), result)
    }

    /// Contact upsert followed by lead creation for a new order. The lead
    /// lock is held across both steps.
    pub async fn sync_order(&self, order_id: OrderId) -> Result<SyncOutcome, SyncError> {
        let _guard = self.leads.lock().await;
        match self.checkout(order_id, None).await? {
            Checkout::MissingEmail => Ok(SyncOutcome::Skipped { reason: "missing_email" }),
            Checkout::LeadCreated { contact_id, lead_id } => {
                Ok(SyncOutcome::Synced { contact_id: Some(contact_id), lead_id: Some(lead_id) })
            }
        }
    }

    /// Looks the contact up by email and updates it, or creates it.
    /// `Ok(None)` when the customer has no email to correlate on.
    pub async fn sync_customer(&self, customer_id: CustomerId) -> Result<Option<ContactId>, SyncError> {
        let customer = self.load_customer(customer_id).await?;
        let email = customer.contact_email();
        if email.is_empty() {
            return Ok(None);
        }

        let existing = self.client.find_contact_by_email(email).await?.map(|found| found.crm_id);
        let payload =
            mapping::contact_from_customer(&customer, &AffiliateAttribution::default(), existing);
        let contact_id = self.client.upsert_contact(&payload).await?;
        log_contact(existing, contact_id, "customer_id", &customer_id.to_string());
        Ok(Some(contact_id))
    }

    pub async fn upsert_contact_from_order(
        &self,
        order: &Order,
    ) -> Result<Option<ContactId>, SyncError> {
        let email = order.billing.email.trim();
        if email.is_empty() {
            return Ok(None);
        }

        let attribution = self.stores.affiliates.attribution_for_order(order.id).await?;
        let existing = self.client.find_contact_by_email(email).await?.map(|found| found.crm_id);
        let payload = mapping::contact_from_order(order, &attribution, existing, Utc::now());
        let contact_id = self.client.upsert_contact(&payload).await?;
        log_contact(existing, contact_id, "order_id", &order.id.to_string());
        Ok(Some(contact_id))
    }

    /// Creates the order's lead for a known contact and records its id. A
    /// recorded lead short circuits before any network call.
    pub async fn create_lead_from_order(
        &self,
        order_id: OrderId,
        contact_id: ContactId,
    ) -> Result<LeadRef, SyncError> {
        let _guard = self.leads.lock().await;
        match self.checkout(order_id, Some(contact_id)).await? {
            Checkout::LeadCreated { lead_id, .. } => Ok(LeadRef { order_id, lead_id }),
            Checkout::MissingEmail => Err(invariant("checkout with a known contact skipped it")),
        }
    }

    /// Runs the checkout actions planned by the lead flow. Callers hold the
    /// lead lock. `UpsertContact` is a no-op when the contact is already known.
    async fn checkout(
        &self,
        order_id: OrderId,
        known_contact: Option<ContactId>,
    ) -> Result<Checkout, SyncError> {
        let state = LeadSyncState::from_recorded(self.recorded_lead(order_id).await?);
        let transition =
            self.flow.apply(&state, &LeadSyncEvent::CheckoutCompleted).map_err(DomainError::from)?;
        debug!(event_name = "lead.transition", order_id = %order_id, actions = ?transition.actions, "lead transition planned");

        let order = self.load_order(order_id).await?;
        let mut contact_id = known_contact;
        let mut lead_id = None;
        for action in transition.actions {
            match action {
                LeadSyncAction::UpsertContact => {
                    if contact_id.is_none() {
                        match self.upsert_contact_from_order(&order).await? {
                            Some(id) => contact_id = Some(id),
                            None => return Ok(Checkout::MissingEmail),
                        }
                    }
                }
                LeadSyncAction::CreateLead => {
                    let contact_id =
                        contact_id.ok_or_else(|| invariant("lead planned before its contact"))?;
                    let payload =
                        mapping::lead_from_order(&order, contact_id, self.pipeline_id, Utc::now());
                    lead_id = Some(self.client.upsert_lead(&payload).await?);
                }
                LeadSyncAction::RecordLeadId => {
                    let lead_id =
                        lead_id.ok_or_else(|| invariant("lead id recorded before creation"))?;
                    self.stores
                        .order_meta
                        .set(order_id, LEAD_ID_META_KEY, &lead_id.to_string())
                        .await?;
                }
                LeadSyncAction::PatchLeadStatus { .. } => {
                    return Err(invariant("checkout planned a status patch"));
                }
            }
        }

        let (Some(contact_id), Some(lead_id)) = (contact_id, lead_id) else {
            return Err(invariant("checkout finished without a lead"));
        };
        info!(
            event_name = "lead.created",
            order_id = %order_id,
            contact_id = %contact_id,
            lead_id = %lead_id,
            "kommo lead created"
        );
        Ok(Checkout::LeadCreated { contact_id, lead_id })
    }

    /// Patches only the status field of the recorded lead.
    pub async fn update_lead_status(
        &self,
        order_id: OrderId,
        old_status: OrderStatus,
        new_status: OrderStatus,
    ) -> Result<LeadRef, SyncError> {
        let _guard = self.leads.lock().await;
        let state = LeadSyncState::from_recorded(self.recorded_lead(order_id).await?);
        let transition = self
            .flow
            .apply(&state, &LeadSyncEvent::StatusChanged { old_status, new_status })
            .map_err(DomainError::from)?;

        let Some(LeadSyncAction::PatchLeadStatus { lead_id, status }) =
            transition.actions.into_iter().next()
        else {
            return Err(invariant("status change planned no lead patch"));
        };

        self.client.upsert_lead(&mapping::lead_status_patch(lead_id, &status)).await?;
        info!(
            event_name = "lead.status_patched",
            order_id = %order_id,
            lead_id = %lead_id,
            status = %status,
            "kommo lead status updated"
        );
        Ok(LeadRef { order_id, lead_id })
    }

    async fn recorded_lead(&self, order_id: OrderId) -> Result<Option<LeadId>, SyncError> {
        let raw = self.stores.order_meta.get(order_id, LEAD_ID_META_KEY).await?;
        match raw.filter(|value| !value.trim().is_empty()) {
            Some(raw) => Ok(Some(LeadId::parse(&raw)?)),
            None => Ok(None),
        }
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order, SyncError> {
        self.stores
            .commerce
            .find_order(order_id)
            .await?
            .ok_or(SyncError::NotFound { kind: "order", id: order_id.0 })
    }

    async fn load_customer(&self, customer_id: CustomerId) -> Result<Customer, SyncError> {
        self.stores
            .commerce
            .find_customer(customer_id)
            .await?
            .ok_or(SyncError::NotFound { kind: "customer", id: customer_id.0 })
    }

    async fn customer_outcome(&self, event: &'static str, customer_id: CustomerId) -> SyncOutcome {
        let result = self.sync_customer(customer_id).await.map(|contact_id| match contact_id {
            Some(contact_id) => SyncOutcome::Synced { contact_id: Some(contact_id), lead_id: None },
            None => SyncOutcome::Skipped { reason: "missing_email" },
        });
        self.finish(event, &customer_id.to_string(), result)
    }

    fn finish(
        &self,
        event: &'static str,
        subject_id: &str,
        result: Result<SyncOutcome, SyncError>,
    ) -> SyncOutcome {
        match result {
            Ok(outcome) => {
                debug!(event_name = "sync.completed", event, subject_id, outcome = ?outcome, "sync finished");
                outcome
            }
            Err(error) => {
                warn!(
                    event_name = "sync.failed",
                    event,
                    subject_id,
                    error_class = error.error_class(),
                    error = %error,
                    "sync failed"
                );
                SyncOutcome::failed(&error)
            }
        }
    }
}

enum Checkout {
    MissingEmail,
    LeadCreated { contact_id: ContactId, lead_id: LeadId },
}

fn invariant(message: &str) -> SyncError {
    DomainError::InvariantViolation(message.to_string()).into()
}

fn log_contact(existing: Option<ContactId>, contact_id: ContactId, subject: &str, subject_id: &str) {
    let event_name = if existing.is_some() { "contact.updated" } else { "contact.created" };
    info!(event_name, subject, subject_id, contact_id = %contact_id, "kommo contact synced");
}
