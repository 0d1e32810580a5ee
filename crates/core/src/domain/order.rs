use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::{join_name, CustomerId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub i64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order status slug as reported by the store (`pending`, `processing`, ...).
/// Kept open-ended because stores register custom statuses.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderStatus(pub String);

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDetails {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address_1: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
}

impl BillingDetails {
    pub fn full_name(&self) -> String {
        join_name(&self.first_name, &self.last_name)
    }
}

/// One purchased product. `attributes` holds the selected variation values in
/// the order the product defines them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    pub status: OrderStatus,
    #[serde(default)]
    pub billing: BillingDetails,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub total: Decimal,
    #[serde(default)]
    pub discount_total: Decimal,
    #[serde(default)]
    pub payment_method_title: String,
    #[serde(default)]
    pub coupon_codes: Vec<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

impl Order {
    pub fn product_names(&self) -> Vec<&str> {
        self.line_items.iter().map(|item| item.name.as_str()).collect()
    }

    /// Variation value at `index` on the first line item, empty when absent.
    pub fn first_item_attribute(&self, index: usize) -> &str {
        self.line_items
            .first()
            .and_then(|item| item.attributes.get(index))
            .map(String::as_str)
            .unwrap_or("")
    }
}
