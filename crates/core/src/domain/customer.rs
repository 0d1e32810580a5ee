use serde::{Deserialize, Serialize};

use crate::domain::order::BillingDetails;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub i64);

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store account as seen by the e-commerce platform. `email` is the account
/// email and may differ from `billing.email`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub billing: BillingDetails,
}

impl Customer {
    pub fn full_name(&self) -> String {
        join_name(&self.first_name, &self.last_name)
    }

    /// Email the CRM contact is keyed on: the account email, or the billing
    /// email when the account has none.
    pub fn contact_email(&self) -> &str {
        let email = self.email.trim();
        if email.is_empty() {
            self.billing.email.trim()
        } else {
            email
        }
    }
}

pub(crate) fn join_name(first: &str, last: &str) -> String {
    format!("{first} {last}")
}
