pub mod engine;
pub mod states;

pub use engine::{FlowTransitionError, LeadSyncFlow};
pub use states::{LeadSyncAction, LeadSyncEvent, LeadSyncState, TransitionOutcome};
