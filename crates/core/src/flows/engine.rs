use thiserror::Error;

use crate::flows::states::{LeadSyncAction, LeadSyncEvent, LeadSyncState, TransitionOutcome};

/// Per-order lead lifecycle. The resulting state of `CheckoutCompleted` is only
/// known once the CRM has returned the new lead id, so the engine plans
/// actions and the caller executes them in order.
#[derive(Clone, Debug, Default)]
pub struct LeadSyncFlow;

impl LeadSyncFlow {
    pub fn apply(
        &self,
        current: &LeadSyncState,
        event: &LeadSyncEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        let actions = match (current, event) {
            (LeadSyncState::NoLead, LeadSyncEvent::CheckoutCompleted) => vec![
                LeadSyncAction::UpsertContact,
                LeadSyncAction::CreateLead,
                LeadSyncAction::RecordLeadId,
            ],
            (LeadSyncState::LeadCreated { lead_id }, LeadSyncEvent::CheckoutCompleted) => {
                return Err(FlowTransitionError::LeadAlreadyExists { lead_id: lead_id.0 });
            }
            (LeadSyncState::LeadCreated { lead_id }, LeadSyncEvent::StatusChanged { new_status, .. }) => {
                vec![LeadSyncAction::PatchLeadStatus { lead_id: *lead_id, status: new_status.clone() }]
            }
            (LeadSyncState::NoLead, LeadSyncEvent::StatusChanged { .. }) => {
                return Err(FlowTransitionError::NoLeadRecorded);
            }
        };

        Ok(TransitionOutcome { from: current.clone(), event: event.clone(), actions })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("lead {lead_id} already recorded for this order")]
    LeadAlreadyExists { lead_id: i64 },
    #[error("no lead recorded for this order")]
    NoLeadRecorded,
}
