//! Translation of store records into Kommo's custom-field payloads.
//!
//! Field ids are fixed for the connected account. Nothing here validates them
//! against the CRM schema; `kommo-sync fields` lists the live schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::affiliate::AffiliateAttribution;
use crate::domain::crm::{ContactId, LeadId};
use crate::domain::customer::Customer;
use crate::domain::order::{Order, OrderId, OrderStatus};

pub mod fields {
    pub const PHONE: i64 = 1_841_202;
    pub const EMAIL: i64 = 1_841_204;
    pub const COUNTRY: i64 = 2_075_892;
    pub const CITY: i64 = 2_098_967;
    pub const CREATION_DATE: i64 = 2_075_894;
    pub const IB_CODE: i64 = 2_083_336;
    pub const AFFILIATE_OF: i64 = 2_102_113;

    pub const DATE_OF_PURCHASE: i64 = 1_973_834;
    pub const DATE_OF_PURCHASE_DT: i64 = 2_099_105;
    pub const TOTAL: i64 = 2_098_971;
    pub const PRODUCTS: i64 = 2_085_492;
    pub const COUPONS: i64 = 2_086_584;
    pub const TOTAL_AMOUNT: i64 = 2_083_352;
    pub const DISCOUNT: i64 = 2_083_350;
    pub const ORDER_STATUS: i64 = 2_099_073;
    pub const PAYMENT_METHOD: i64 = 2_086_632;
    pub const STEP: i64 = 2_099_107;
    pub const ACCOUNT_SIZE: i64 = 2_099_109;
    pub const TRADING_PLATFORM: i64 = 2_099_111;
}

const CREATION_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LIST_SEPARATOR: &str = ", ";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValue {
    pub field_id: i64,
    pub values: Vec<FieldValue>,
}

impl CustomFieldValue {
    pub fn new(field_id: i64, value: impl Into<Value>) -> Self {
        Self { field_id, values: vec![FieldValue { value: value.into() }] }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ContactId>,
    pub name: String,
    pub custom_fields_values: Vec<CustomFieldValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedRef {
    pub id: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeadEmbedded {
    pub contacts: Vec<EmbeddedRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeadPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<LeadId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<i64>,
    #[serde(rename = "_embedded", skip_serializing_if = "Option::is_none")]
    pub embedded: Option<LeadEmbedded>,
    pub custom_fields_values: Vec<CustomFieldValue>,
}

pub fn lead_name(order_id: OrderId) -> String {
    format!("Order #{order_id}")
}

fn affiliate_fields(attribution: &AffiliateAttribution) -> [CustomFieldValue; 2] {
    [
        CustomFieldValue::new(fields::IB_CODE, attribution.ib_code.clone()),
        CustomFieldValue::new(fields::AFFILIATE_OF, attribution.affiliate_of.clone()),
    ]
}

/// Contact built from order billing data. `now` stands in for a missing
/// creation date.
pub fn contact_from_order(
    order: &Order,
    attribution: &AffiliateAttribution,
    existing: Option<ContactId>,
    now: DateTime<Utc>,
) -> ContactPayload {
    let billing = &order.billing;
    let created_at = order.created_at.unwrap_or(now);

    let mut custom_fields_values = vec![
        CustomFieldValue::new(fields::PHONE, billing.phone.clone()),
        CustomFieldValue::new(fields::EMAIL, billing.email.clone()),
        CustomFieldValue::new(fields::COUNTRY, billing.country.clone()),
        CustomFieldValue::new(fields::CITY, billing.city.clone()),
        CustomFieldValue::new(
            fields::CREATION_DATE,
            created_at.format(CREATION_DATE_FORMAT).to_string(),
        ),
    ];
    custom_fields_values.extend(affiliate_fields(attribution));

    ContactPayload { id: existing, name: billing.full_name(), custom_fields_values }
}

/// Contact built from a store account. Carries no creation date.
pub fn contact_from_customer(
    customer: &Customer,
    attribution: &AffiliateAttribution,
    existing: Option<ContactId>,
) -> ContactPayload {
    let billing = &customer.billing;
    let mut custom_fields_values = vec![
        CustomFieldValue::new(fields::PHONE, billing.phone.clone()),
        CustomFieldValue::new(fields::EMAIL, customer.contact_email()),
        CustomFieldValue::new(fields::COUNTRY, billing.country.clone()),
        CustomFieldValue::new(fields::CITY, billing.city.clone()),
    ];
    custom_fields_values.extend(affiliate_fields(attribution));

    ContactPayload { id: existing, name: customer.full_name(), custom_fields_values }
}

pub fn lead_from_order(
    order: &Order,
    contact_id: ContactId,
    pipeline_id: i64,
    now: DateTime<Utc>,
) -> LeadPayload {
    let purchased_at = order.created_at.unwrap_or(now).timestamp();
    let total = order.total.to_string();

    let custom_fields_values = vec![
        CustomFieldValue::new(fields::DATE_OF_PURCHASE, purchased_at),
        CustomFieldValue::new(fields::DATE_OF_PURCHASE_DT, purchased_at),
        CustomFieldValue::new(fields::TOTAL, total.clone()),
        CustomFieldValue::new(fields::PRODUCTS, order.product_names().join(LIST_SEPARATOR)),
        CustomFieldValue::new(fields::COUPONS, order.coupon_codes.join(LIST_SEPARATOR)),
        CustomFieldValue::new(fields::TOTAL_AMOUNT, total),
        CustomFieldValue::new(fields::DISCOUNT, order.discount_total.to_string()),
        CustomFieldValue::new(fields::ORDER_STATUS, order.status.as_str()),
        CustomFieldValue::new(fields::PAYMENT_METHOD, order.payment_method_title.clone()),
        CustomFieldValue::new(fields::STEP, order.first_item_attribute(0)),
        CustomFieldValue::new(fields::ACCOUNT_SIZE, order.first_item_attribute(1)),
        CustomFieldValue::new(fields::TRADING_PLATFORM, order.first_item_attribute(2)),
    ];

    LeadPayload {
        id: None,
        name: Some(lead_name(order.id)),
        pipeline_id: Some(pipeline_id),
        embedded: Some(LeadEmbedded { contacts: vec![EmbeddedRef { id: contact_id.0 }] }),
        custom_fields_values,
    }
}

/// Patch carrying only the status field.
pub fn lead_status_patch(lead_id: LeadId, status: &OrderStatus) -> LeadPayload {
    LeadPayload {
        id: Some(lead_id),
        name: None,
        pipeline_id: None,
        embedded: None,
        custom_fields_values: vec![CustomFieldValue::new(fields::ORDER_STATUS, status.as_str())],
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{
        contact_from_customer, contact_from_order, fields, lead_from_order, lead_status_patch,
        ContactPayload,
    };
    use crate::domain::affiliate::AffiliateAttribution;
    use crate::domain::crm::{ContactId, LeadId};
    use crate::domain::customer::{Customer, CustomerId};
    use crate::domain::order::{BillingDetails, LineItem, Order, OrderId, OrderStatus};

    fn order() -> Order {
        Order {
            id: OrderId(501),
            customer_id: Some(CustomerId(12)),
            status: OrderStatus("processing".to_owned()),
            billing: BillingDetails {
                first_name: "Ana".to_owned(),
                last_name: "Silva".to_owned(),
                email: "a@example.com".to_owned(),
                phone: "+351 900 000 000".to_owned(),
                address_1: "Rua 1".to_owned(),
                city: "Lisbon".to_owned(),
                country: "PT".to_owned(),
            },
            created_at: Some(Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()),
            total: Decimal::new(19_900, 2),
            discount_total: Decimal::new(1_000, 2),
            payment_method_title: "Credit card".to_owned(),
            coupon_codes: vec!["SPRING".to_owned(), "VIP".to_owned()],
            line_items: vec![
                LineItem {
                    name: "Challenge 100k".to_owned(),
                    attributes: vec!["2 Step".to_owned(), "100k".to_owned(), "MT5".to_owned()],
                },
                LineItem { name: "Add-on".to_owned(), attributes: Vec::new() },
            ],
        }
    }

    fn value_of(payload: &[super::CustomFieldValue], field_id: i64) -> serde_json::Value {
        payload
            .iter()
            .find(|field| field.field_id == field_id)
            .map(|field| field.values[0].value.clone())
            .unwrap_or_else(|| panic!("field {field_id} missing"))
    }

    #[test]
    fn new_order_contact_carries_billing_fields_and_sentinels() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let payload = contact_from_order(&order(), &AffiliateAttribution::default(), None, now);

        assert_eq!(payload.id, None);
        assert_eq!(payload.name, "Ana Silva");
        let fields_values = &payload.custom_fields_values;
        assert_eq!(value_of(fields_values, fields::EMAIL), json!("a@example.com"));
        assert_eq!(value_of(fields_values, fields::CITY), json!("Lisbon"));
        assert_eq!(value_of(fields_values, fields::CREATION_DATE), json!("2024-03-05 14:07:09"));
        assert_eq!(value_of(fields_values, fields::IB_CODE), json!("0"));
        assert_eq!(value_of(fields_values, fields::AFFILIATE_OF), json!("0"));
    }

    #[test]
    fn contact_without_creation_date_uses_now() {
        let mut order = order();
        order.created_at = None;
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let payload = contact_from_order(&order, &AffiliateAttribution::default(), None, now);

        assert_eq!(
            value_of(&payload.custom_fields_values, fields::CREATION_DATE),
            json!("2025-01-02 03:04:05")
        );
    }

    #[test]
    fn existing_contact_serializes_its_id() {
        let attribution =
            AffiliateAttribution::new(Some("881".to_owned()), Some("ib@example.com".to_owned()));
        let payload = contact_from_order(&order(), &attribution, Some(ContactId(44)), Utc::now());
        let encoded = serde_json::to_value(&payload).expect("serialize");

        assert_eq!(encoded["id"], json!(44));
        assert_eq!(value_of(&payload.custom_fields_values, fields::IB_CODE), json!("881"));
    }

    #[test]
    fn customer_contact_has_no_creation_date() {
        let customer = Customer {
            id: CustomerId(12),
            first_name: "Ana".to_owned(),
            last_name: "Silva".to_owned(),
            email: "ana@example.com".to_owned(),
            billing: order().billing,
        };
        let ContactPayload { name, custom_fields_values, id } =
            contact_from_customer(&customer, &AffiliateAttribution::default(), None);

        assert_eq!(id, None);
        assert_eq!(name, "Ana Silva");
        assert_eq!(value_of(&custom_fields_values, fields::EMAIL), json!("ana@example.com"));
        assert!(custom_fields_values.iter().all(|field| field.field_id != fields::CREATION_DATE));
        assert_eq!(value_of(&custom_fields_values, fields::AFFILIATE_OF), json!("0"));
    }

    #[test]
    fn customer_contact_without_account_email_uses_billing_email() {
        let customer = Customer {
            id: CustomerId(12),
            first_name: "Ana".to_owned(),
            last_name: "Silva".to_owned(),
            email: String::new(),
            billing: order().billing,
        };
        let payload = contact_from_customer(&customer, &AffiliateAttribution::default(), None);

        assert_eq!(value_of(&payload.custom_fields_values, fields::EMAIL), json!("a@example.com"));
    }

    #[test]
    fn lead_payload_matches_crm_shape() {
        let payload = lead_from_order(&order(), ContactId(77), 9_564_319, Utc::now());
        let encoded = serde_json::to_value(&payload).expect("serialize");

        assert_eq!(encoded["name"], json!("Order #501"));
        assert_eq!(encoded["pipeline_id"], json!(9_564_319));
        assert_eq!(encoded["_embedded"]["contacts"], json!([{ "id": 77 }]));
        assert!(encoded.get("id").is_none());

        let values = &payload.custom_fields_values;
        let ts = order().created_at.unwrap().timestamp();
        assert_eq!(value_of(values, fields::DATE_OF_PURCHASE), json!(ts));
        assert_eq!(value_of(values, fields::DATE_OF_PURCHASE_DT), json!(ts));
        assert_eq!(value_of(values, fields::TOTAL), json!("199.00"));
        assert_eq!(value_of(values, fields::PRODUCTS), json!("Challenge 100k, Add-on"));
        assert_eq!(value_of(values, fields::COUPONS), json!("SPRING, VIP"));
        assert_eq!(value_of(values, fields::DISCOUNT), json!("10.00"));
        assert_eq!(value_of(values, fields::ORDER_STATUS), json!("processing"));
        assert_eq!(value_of(values, fields::PAYMENT_METHOD), json!("Credit card"));
        assert_eq!(value_of(values, fields::STEP), json!("2 Step"));
        assert_eq!(value_of(values, fields::ACCOUNT_SIZE), json!("100k"));
        assert_eq!(value_of(values, fields::TRADING_PLATFORM), json!("MT5"));
    }

    #[test]
    fn missing_variations_map_to_empty_strings() {
        let mut order = order();
        order.line_items[0].attributes.truncate(1);
        let payload = lead_from_order(&order, ContactId(1), 1, Utc::now());

        assert_eq!(value_of(&payload.custom_fields_values, fields::ACCOUNT_SIZE), json!(""));
        assert_eq!(value_of(&payload.custom_fields_values, fields::TRADING_PLATFORM), json!(""));
    }

    #[test]
    fn status_patch_carries_only_the_status_field() {
        let payload = lead_status_patch(LeadId(90), &OrderStatus("completed".to_owned()));
        let encoded = serde_json::to_value(&payload).expect("serialize");

        assert_eq!(
            encoded,
            json!({
                "id": 90,
                "custom_fields_values": [
                    { "field_id": fields::ORDER_STATUS, "values": [{ "value": "completed" }] }
                ]
            })
        );
    }
}
