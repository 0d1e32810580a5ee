use serde::{Deserialize, Serialize};

use crate::domain::order::OrderId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub i64);

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl LeadId {
    /// Parses a lead id read back from order metadata. Non-numeric values are
    /// rejected rather than coerced.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(value) if value > 0 => Ok(Self(value)),
            _ => Err(DomainError::InvalidLeadId(raw.to_string())),
        }
    }
}

/// Contact matched by email. The first lookup hit is authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRef {
    pub crm_id: ContactId,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRef {
    pub order_id: OrderId,
    pub lead_id: LeadId,
}
