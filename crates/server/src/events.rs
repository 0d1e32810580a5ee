//! E-commerce event ingress.
//!
//! The store posts one JSON event per delivery. Snapshots carried by the event
//! are persisted first so the sync handlers read the same data the store saw,
//! then the matching handler runs and its outcome is echoed back.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use kommo_sync_core::domain::affiliate::Referral;
use kommo_sync_core::errors::{ApplicationError, InterfaceError};
use kommo_sync_core::{Customer, Order, OrderId, OrderStatus};
use kommo_sync_db::RepositoryError;
use kommo_sync_kommo::{KommoRuntime, SyncOutcome};

use crate::signature::{self, SIGNATURE_HEADER};

pub const EVENTS_PATH: &str = "/api/v1/events";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct EventsState {
    runtime: KommoRuntime,
    webhook_secret: Option<SecretString>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    CustomerCreated {
        customer: Customer,
    },
    CustomerUpdated {
        customer: Customer,
    },
    OrderCreated {
        order: Order,
    },
    OrderStatusChanged {
        order_id: OrderId,
        old_status: OrderStatus,
        new_status: OrderStatus,
        #[serde(default)]
        order: Option<Order>,
    },
    ReferralRecorded {
        referral: Referral,
        #[serde(default)]
        affiliate_payment_email: Option<String>,
    },
}

impl StoreEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CustomerCreated { .. } => "customer_created",
            Self::CustomerUpdated { .. } => "customer_updated",
            Self::OrderCreated { .. } => "order_created",
            Self::OrderStatusChanged { .. } => "order_status_changed",
            Self::ReferralRecorded { .. } => "referral_recorded",
        }
    }

    /// Checks that hold across fields and cannot be expressed by the shape alone.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::OrderStatusChanged { order_id, order: Some(order), .. } if order.id != *order_id => {
                Err(format!("order snapshot {} does not match order_id {order_id}", order.id))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventAccepted {
    pub event: &'static str,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SyncOutcome>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventRejected {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

pub fn router(runtime: KommoRuntime, webhook_secret: Option<SecretString>) -> Router {
    Router::new()
        .route(EVENTS_PATH, post(receive_event))
        .with_state(EventsState { runtime, webhook_secret })
}

async fn receive_event(
    State(state): State<EventsState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = correlation_id(&headers);

    if let Some(secret) = &state.webhook_secret {
        let provided = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
        let valid = provided.is_some_and(|provided| {
            signature::verify(secret.expose_secret().as_bytes(), &body, provided)
        });
        if !valid {
            warn!(
                event_name = "ingress.event.signature_rejected",
                correlation_id = %correlation_id,
                signature_present = provided.is_some(),
                "rejected event with missing or invalid signature"
            );
            let rejected = EventRejected {
                error: "The webhook signature is missing or invalid.",
                detail: format!("{SIGNATURE_HEADER} did not match the request body"),
                correlation_id,
            };
            return (StatusCode::UNAUTHORIZED, Json(rejected)).into_response();
        }
    }

    let event = match serde_json::from_slice::<StoreEvent>(&body) {
        Ok(event) => event,
        Err(error) => {
            warn!(
                event_name = "ingress.event.malformed",
                correlation_id = %correlation_id,
                error = %error,
                "rejected malformed event payload"
            );
            return interface_rejection(InterfaceError::BadRequest {
                message: error.to_string(),
                correlation_id,
            });
        }
    };

    let name = event.name();
    if let Err(message) = event.validate() {
        warn!(
            event_name = "ingress.event.inconsistent",
            correlation_id = %correlation_id,
            store_event = name,
            error = %message,
            "rejected inconsistent event payload"
        );
        return interface_rejection(InterfaceError::BadRequest { message, correlation_id });
    }

    info!(
        event_name = "ingress.event.received",
        correlation_id = %correlation_id,
        store_event = name,
        "received store event"
    );

    match dispatch(&state.runtime, event).await {
        Ok(outcome) => {
            info!(
                event_name = "ingress.event.processed",
                correlation_id = %correlation_id,
                store_event = name,
                synced = outcome.as_ref().map(SyncOutcome::is_synced),
                "processed store event"
            );
            let accepted = EventAccepted { event: name, correlation_id, outcome };
            (StatusCode::ACCEPTED, Json(accepted)).into_response()
        }
        Err(error) => {
            warn!(
                event_name = "ingress.event.persist_failed",
                correlation_id = %correlation_id,
                store_event = name,
                error = %error,
                "could not persist event snapshot"
            );
            interface_rejection(
                ApplicationError::Persistence(error.to_string()).into_interface(correlation_id),
            )
        }
    }
}

/// Persists the snapshot carried by `event` and runs the matching handler.
/// Only storage failures surface as errors; sync failures live in the outcome.
async fn dispatch(
    runtime: &KommoRuntime,
    event: StoreEvent,
) -> Result<Option<SyncOutcome>, RepositoryError> {
    let outcome = match event {
        StoreEvent::CustomerCreated { customer } => {
            runtime.commerce.save_customer(&customer).await?;
            runtime.sync.handle_new_customer(customer.id).await
        }
        StoreEvent::CustomerUpdated { customer } => {
            runtime.commerce.save_customer(&customer).await?;
            runtime.sync.handle_customer_update(customer.id).await
        }
        StoreEvent::OrderCreated { order } => {
            runtime.commerce.save_order(&order).await?;
            runtime.sync.handle_new_order(order.id).await
        }
        StoreEvent::OrderStatusChanged { order_id, old_status, new_status, order } => {
            if let Some(order) = order {
                runtime.commerce.save_order(&order).await?;
            }
            runtime.sync.handle_order_status_change(order_id, old_status, new_status).await
        }
        StoreEvent::ReferralRecorded { referral, affiliate_payment_email } => {
            if let Some(email) = affiliate_payment_email.filter(|email| !email.trim().is_empty()) {
                runtime.affiliates.save_affiliate(referral.affiliate_id, email.trim()).await?;
            }
            runtime.affiliates.record_referral(&referral).await?;
            return Ok(None);
        }
    };

    Ok(Some(outcome))
}

fn interface_rejection(error: InterfaceError) -> Response {
    let status = match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let detail = match &error {
        InterfaceError::BadRequest { message, .. }
        | InterfaceError::ServiceUnavailable { message, .. }
        | InterfaceError::Internal { message, .. } => message.clone(),
    };
    let rejected = EventRejected {
        error: error.user_message(),
        detail,
        correlation_id: error.correlation_id().to_owned(),
    };
    (status, Json(rejected)).into_response()
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use kommo_sync_core::config::AppConfig;
    use kommo_sync_core::domain::credentials::TokenState;
    use kommo_sync_core::OrderId;
    use kommo_sync_db::repositories::{
        CredentialsUpdate, SqlOrderMetadataRepository, LEAD_ID_META_KEY,
    };
    use kommo_sync_db::{
        connect_with_settings, migrations, AffiliateRepository, CommerceRepository, DbPool,
        OrderMetadataRepository,
    };
    use kommo_sync_kommo::KommoRuntime;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{any, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::events::{router, EVENTS_PATH};
    use crate::signature;

    async fn runtime(server: &MockServer) -> (KommoRuntime, DbPool) {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");

        let mut config = AppConfig::default().kommo;
        config.base_url = Some(server.uri());
        let runtime = KommoRuntime::from_pool(&config, pool.clone()).expect("runtime");
        runtime
            .credentials
            .update(&CredentialsUpdate {
                subdomain: Some("shop".to_owned()),
                client_id: Some("client".to_owned()),
                client_secret: Some(SecretString::from("secret")),
                redirect_uri: Some("https://shop.example/cb".to_owned()),
                authorization_code: None,
            })
            .await
            .expect("credentials");
        runtime
            .credentials
            .save_token_state(&TokenState {
                access_token: Some("live-token".to_owned()),
                refresh_token: Some("refresh-1".to_owned()),
                expires_at: Some(Utc::now().timestamp() + 3_600),
            })
            .await
            .expect("token");

        (runtime, pool)
    }

    fn post_event(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(EVENTS_PATH)
            .header("content-type", "application/json")
            .header("x-request-id", "req-42")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    fn order_created() -> Value {
        json!({
            "event": "order_created",
            "order": {
                "id": 501,
                "status": "processing",
                "total": "199.00",
                "billing": { "first_name": "Ana", "last_name": "Silva", "email": "a@example.com" },
                "line_items": [{ "name": "Challenge 100k", "attributes": ["2 Step"] }]
            }
        })
    }

    #[tokio::test]
    async fn order_created_event_syncs_contact_and_lead() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/contacts"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v4/contacts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "_embedded": { "contacts": [{ "id": 7001 }] } })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v4/leads"))
            .and(body_partial_json(json!([{ "name": "Order #501" }])))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "_embedded": { "leads": [{ "id": 9001 }] } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (runtime, pool) = runtime(&server).await;
        let app = router(runtime.clone(), None);

        let (status, body) = send(app, post_event(&order_created())).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["event"], "order_created");
        assert_eq!(body["correlation_id"], "req-42");
        assert_eq!(body["outcome"], json!({ "status": "synced", "contact_id": 7001, "lead_id": 9001 }));

        let (lead_id,): (String,) = sqlx::query_as(
            "SELECT meta_value FROM order_meta WHERE order_id = ? AND meta_key = ?",
        )
        .bind(501_i64)
        .bind(LEAD_ID_META_KEY)
        .fetch_one(&pool)
        .await
        .expect("lead meta");
        assert_eq!(lead_id, "9001");
        pool.close().await;
    }

    #[tokio::test]
    async fn sync_failure_is_still_accepted() {
        let server = MockServer::start().await;
        Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0).mount(&server).await;
        let (runtime, pool) = runtime(&server).await;

        let (status, body) = send(
            router(runtime, None),
            post_event(&json!({
                "event": "order_status_changed",
                "order_id": 77,
                "old_status": "pending",
                "new_status": "cancelled"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["outcome"]["status"], "failed");
        assert_eq!(body["outcome"]["error_class"], "no-lead-recorded");
        pool.close().await;
    }

    #[tokio::test]
    async fn status_change_snapshot_is_stored_before_patch() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/v4/leads"))
            .and(body_partial_json(json!([{ "id": 9001 }])))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "_embedded": { "leads": [{ "id": 9001 }] } })),
            )
            .expect(1)
            .mount(&server)
            .await;
        let (runtime, pool) = runtime(&server).await;
        SqlOrderMetadataRepository::new(pool.clone())
            .set(OrderId(501), LEAD_ID_META_KEY, "9001")
            .await
            .expect("meta");

        let (status, body) = send(
            router(runtime.clone(), None),
            post_event(&json!({
                "event": "order_status_changed",
                "order_id": 501,
                "old_status": "processing",
                "new_status": "completed",
                "order": { "id": 501, "status": "completed", "total": "199.00" }
            })),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["outcome"], json!({ "status": "synced", "lead_id": 9001 }));
        let stored = runtime.commerce.find_order(OrderId(501)).await.expect("find").expect("order");
        assert_eq!(stored.status.as_str(), "completed");
        pool.close().await;
    }

    #[tokio::test]
    async fn referral_event_feeds_affiliate_attribution() {
        let server = MockServer::start().await;
        let (runtime, pool) = runtime(&server).await;

        let (status, body) = send(
            router(runtime.clone(), None),
            post_event(&json!({
                "event": "referral_recorded",
                "referral": { "referral_id": "881", "affiliate_id": 12, "reference": "501" },
                "affiliate_payment_email": "ib@example.com"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.get("outcome").is_none());
        let attribution =
            runtime.affiliates.attribution_for_order(OrderId(501)).await.expect("attribution");
        assert_eq!(attribution.ib_code, "881");
        assert_eq!(attribution.affiliate_of, "ib@example.com");
        pool.close().await;
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() {
        let server = MockServer::start().await;
        let (runtime, pool) = runtime(&server).await;

        let (status, body) =
            send(router(runtime, None), post_event(&json!({ "event": "order_refunded" }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["correlation_id"], "req-42");
        assert_eq!(
            body["error"],
            "The event could not be processed. Check the payload and try again."
        );
        pool.close().await;
    }

    #[tokio::test]
    async fn status_change_with_foreign_snapshot_is_bad_request() {
        let server = MockServer::start().await;
        Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0).mount(&server).await;
        let (runtime, pool) = runtime(&server).await;

        let (status, body) = send(
            router(runtime.clone(), None),
            post_event(&json!({
                "event": "order_status_changed",
                "order_id": 501,
                "old_status": "processing",
                "new_status": "completed",
                "order": { "id": 502, "status": "completed", "total": "199.00" }
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["correlation_id"], "req-42");
        assert_eq!(body["detail"], "order snapshot 502 does not match order_id 501");
        assert_eq!(runtime.commerce.find_order(OrderId(502)).await.expect("find"), None);
        assert_eq!(runtime.commerce.find_order(OrderId(501)).await.expect("find"), None);
        pool.close().await;
    }

    #[tokio::test]
    async fn signed_webhooks_require_a_valid_signature() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/contacts"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v4/contacts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "_embedded": { "contacts": [{ "id": 3 }] } })),
            )
            .mount(&server)
            .await;
        let (runtime, pool) = runtime(&server).await;
        let app = router(runtime, Some(SecretString::from("hook-secret")));

        let payload = json!({
            "event": "customer_created",
            "customer": { "id": 12, "first_name": "Ana", "last_name": "Silva", "email": "a@example.com" }
        })
        .to_string();

        let unsigned = Request::builder()
            .method("POST")
            .uri(EVENTS_PATH)
            .body(Body::from(payload.clone()))
            .expect("request");
        let (status, _) = send(app.clone(), unsigned).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let forged = Request::builder()
            .method("POST")
            .uri(EVENTS_PATH)
            .header("x-wc-webhook-signature", signature::sign(b"wrong", payload.as_bytes()))
            .body(Body::from(payload.clone()))
            .expect("request");
        let (status, _) = send(app.clone(), forged).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let signed = Request::builder()
            .method("POST")
            .uri(EVENTS_PATH)
            .header("x-wc-webhook-signature", signature::sign(b"hook-secret", payload.as_bytes()))
            .body(Body::from(payload))
            .expect("request");
        let (status, body) = send(app, signed).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["event"], "customer_created");
        assert_eq!(body["outcome"], json!({ "status": "synced", "contact_id": 3 }));
        assert!(!body["correlation_id"].as_str().expect("id").is_empty());
        pool.close().await;
    }

    #[tokio::test]
    async fn closed_store_maps_to_service_unavailable() {
        let server = MockServer::start().await;
        let (runtime, pool) = runtime(&server).await;
        pool.close().await;

        let (status, body) = send(router(runtime, None), post_event(&order_created())).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["correlation_id"], "req-42");
    }
}
