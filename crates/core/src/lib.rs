pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod mapping;

pub use auth::TokenPhase;
pub use domain::affiliate::{AffiliateAttribution, Referral, AFFILIATE_SENTINEL};
pub use domain::credentials::{Credentials, TokenPair, TokenState};
pub use domain::crm::{ContactId, ContactRef, LeadId, LeadRef};
pub use domain::customer::{Customer, CustomerId};
pub use domain::order::{BillingDetails, LineItem, Order, OrderId, OrderStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{LeadSyncAction, LeadSyncEvent, LeadSyncFlow, LeadSyncState};
pub use mapping::{ContactPayload, CustomFieldValue, LeadPayload};
