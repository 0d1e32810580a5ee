use serde::{Deserialize, Serialize};

use crate::domain::crm::LeadId;
use crate::domain::order::OrderStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadSyncState {
    NoLead,
    LeadCreated { lead_id: LeadId },
}

impl LeadSyncState {
    pub fn from_recorded(lead_id: Option<LeadId>) -> Self {
        match lead_id {
            Some(lead_id) => Self::LeadCreated { lead_id },
            None => Self::NoLead,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadSyncEvent {
    CheckoutCompleted,
    StatusChanged { old_status: OrderStatus, new_status: OrderStatus },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadSyncAction {
    UpsertContact,
    CreateLead,
    RecordLeadId,
    PatchLeadStatus { lead_id: LeadId, status: OrderStatus },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: LeadSyncState,
    pub event: LeadSyncEvent,
    pub actions: Vec<LeadSyncAction>,
}
