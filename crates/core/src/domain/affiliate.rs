use serde::{Deserialize, Serialize};

/// Value written to the CRM when no affiliate data exists.
pub const AFFILIATE_SENTINEL: &str = "0";

/// Referral attribution attached to contacts. Both fields fall back to
/// [`AFFILIATE_SENTINEL`] instead of being omitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateAttribution {
    /// Referral id recorded for the order ("IB code").
    pub ib_code: String,
    /// Payment email of the referring affiliate.
    pub affiliate_of: String,
}

impl Default for AffiliateAttribution {
    fn default() -> Self {
        Self { ib_code: AFFILIATE_SENTINEL.to_string(), affiliate_of: AFFILIATE_SENTINEL.to_string() }
    }
}

impl AffiliateAttribution {
    pub fn new(ib_code: Option<String>, affiliate_of: Option<String>) -> Self {
        let present = |value: Option<String>| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| AFFILIATE_SENTINEL.to_string())
        };
        Self { ib_code: present(ib_code), affiliate_of: present(affiliate_of) }
    }
}

/// A referral as recorded by the affiliate tracker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub referral_id: String,
    pub affiliate_id: i64,
    /// Order id the referral points at.
    pub reference: String,
}
