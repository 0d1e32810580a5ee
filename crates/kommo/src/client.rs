use std::sync::Arc;

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use kommo_sync_core::domain::crm::{ContactId, ContactRef, LeadId};
use kommo_sync_core::mapping::{ContactPayload, LeadPayload};

use crate::error::{truncate_body, KommoError};
use crate::token::TokenManager;

/// Custom field definition as listed by `/api/v4/{entity}/custom_fields`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    Contacts,
    Leads,
}

impl Entity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Leads => "leads",
        }
    }
}

/// Thin wrapper over the Kommo v4 REST API. Every call obtains its bearer
/// token first and never touches the network when none is available.
#[derive(Clone)]
pub struct KommoClient {
    http: Client,
    tokens: Arc<TokenManager>,
}

impl KommoClient {
    pub fn new(http: Client, tokens: Arc<TokenManager>) -> Self {
        Self { http, tokens }
    }

    /// First contact matching `email`. Kommo answers an empty search with 204.
    pub async fn find_contact_by_email(&self, email: &str) -> Result<Option<ContactRef>, KommoError> {
        let body = self.send(Method::GET, "/api/v4/contacts", &[("query", email)], None).await?;
        let Some(body) = body else {
            return Ok(None);
        };

        Ok(first_embedded_id(&body, Entity::Contacts)
            .map(|id| ContactRef { crm_id: ContactId(id), email: email.to_string() }))
    }

    /// Creates the contact when the payload has no id, updates it otherwise.
    pub async fn upsert_contact(&self, payload: &ContactPayload) -> Result<ContactId, KommoError> {
        let method = if payload.id.is_some() { Method::PATCH } else { Method::POST };
        let id = self.upsert(method, Entity::Contacts, payload).await?;
        Ok(ContactId(id))
    }

    pub async fn upsert_lead(&self, payload: &LeadPayload) -> Result<LeadId, KommoError> {
        let method = if payload.id.is_some() { Method::PATCH } else { Method::POST };
        let id = self.upsert(method, Entity::Leads, payload).await?;
        Ok(LeadId(id))
    }

    pub async fn contact_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, KommoError> {
        self.custom_fields(Entity::Contacts).await
    }

    pub async fn lead_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, KommoError> {
        self.custom_fields(Entity::Leads).await
    }

    pub async fn custom_fields(
        &self,
        entity: Entity,
    ) -> Result<Vec<CustomFieldDefinition>, KommoError> {
        let path = format!("/api/v4/{}/custom_fields", entity.as_str());
        let Some(body) = self.send(Method::GET, &path, &[], None).await? else {
            return Ok(Vec::new());
        };

        let fields = body
            .pointer("/_embedded/custom_fields")
            .cloned()
            .ok_or_else(|| KommoError::MalformedResponse("missing _embedded.custom_fields".into()))?;
        serde_json::from_value(fields)
            .map_err(|error| KommoError::MalformedResponse(error.to_string()))
    }

    async fn upsert<T: Serialize>(
        &self,
        method: Method,
        entity: Entity,
        payload: &T,
    ) -> Result<i64, KommoError> {
        let batch = serde_json::to_value([payload])
            .map_err(|error| KommoError::MalformedResponse(error.to_string()))?;
        let path = format!("/api/v4/{}", entity.as_str());
        let body = self.send(method, &path, &[], Some(&batch)).await?.ok_or_else(|| {
            KommoError::MalformedResponse(format!("empty {} response", entity.as_str()))
        })?;

        first_embedded_id(&body, entity).ok_or_else(|| {
            KommoError::MalformedResponse(format!("missing _embedded.{}[0].id", entity.as_str()))
        })
    }

    /// Sends one request. `Ok(None)` means 204 No Content.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, KommoError> {
        let token = self.tokens.get_access_token().await?;
        let url = format!("{}{}", token.base_url.trim_end_matches('/'), path);
        debug!(event_name = "kommo.api.request", method = %method, path, "calling kommo");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&token.access_token)
            .header(reqwest::header::ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response =
            request.send().await.map_err(|error| KommoError::Transport(error.to_string()))?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KommoError::Http { status: status.as_u16(), body: truncate_body(body) });
        }

        response
            .json::<Value>()
            .await
            .map(Some)
            .map_err(|error| KommoError::MalformedResponse(error.to_string()))
    }
}

fn first_embedded_id(body: &Value, entity: Entity) -> Option<i64> {
    body.get("_embedded")?.get(entity.as_str())?.get(0)?.get("id")?.as_i64()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use kommo_sync_core::domain::credentials::TokenState;
    use kommo_sync_core::domain::crm::{ContactId, LeadId};
    use kommo_sync_core::mapping::{ContactPayload, CustomFieldValue};

    use super::KommoClient;
    use crate::error::{KommoError, TokenError};
    use crate::oauth::OAuthClient;
    use crate::token::tests::configured_store;
    use crate::token::TokenManager;

    async fn client(server: &MockServer, with_token: bool) -> KommoClient {
        let store = configured_store().await;
        if with_token {
            store
                .save_token_state(&TokenState {
                    access_token: Some("live-token".to_owned()),
                    refresh_token: Some("refresh".to_owned()),
                    expires_at: Some(Utc::now().timestamp() + 3_600),
                })
                .await
                .expect("seed token");
        }
        let http = reqwest::Client::new();
        let tokens = TokenManager::new(store, Arc::new(OAuthClient::new(http.clone())), Some(server.uri()));
        KommoClient::new(http, Arc::new(tokens))
    }

    #[tokio::test]
    async fn contact_search_takes_first_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/contacts"))
            .and(query_param("query", "a@example.com"))
            .and(header("authorization", "Bearer live-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": { "contacts": [{ "id": 11 }, { "id": 12 }] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let found = client(&server, true)
            .await
            .find_contact_by_email("a@example.com")
            .await
            .expect("search")
            .expect("match");

        assert_eq!(found.crm_id, ContactId(11));
        assert_eq!(found.email, "a@example.com");
    }

    #[tokio::test]
    async fn empty_search_is_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/contacts"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let found =
            client(&server, true).await.find_contact_by_email("none@example.com").await.expect("search");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn upsert_with_id_patches_single_element_list() {
        let server = MockServer::start().await;
        let payload = ContactPayload {
            id: Some(ContactId(11)),
            name: "Ana Silva".to_owned(),
            custom_fields_values: vec![CustomFieldValue::new(1_841_204, "a@example.com")],
        };
        Mock::given(method("PATCH"))
            .and(path("/api/v4/contacts"))
            .and(body_json(json!([{
                "id": 11,
                "name": "Ana Silva",
                "custom_fields_values": [
                    { "field_id": 1_841_204, "values": [{ "value": "a@example.com" }] }
                ]
            }])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": { "contacts": [{ "id": 11, "updated_at": 1 }] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server, true).await.upsert_contact(&payload).await.expect("patch");
        assert_eq!(id, ContactId(11));
    }

    #[tokio::test]
    async fn lead_response_without_id_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/leads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "_embedded": { "leads": [] } })))
            .mount(&server)
            .await;

        let payload = kommo_sync_core::mapping::lead_status_patch(
            LeadId(1),
            &kommo_sync_core::domain::order::OrderStatus("x".to_owned()),
        );
        let payload = kommo_sync_core::mapping::LeadPayload { id: None, ..payload };

        let error = client(&server, true).await.upsert_lead(&payload).await.expect_err("malformed");
        assert!(matches!(error, KommoError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn http_failure_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let error = client(&server, true)
            .await
            .find_contact_by_email("a@example.com")
            .await
            .expect_err("unauthorized");
        assert!(matches!(error, KommoError::Http { status: 401, ref body } if body == "Unauthorized"));
        assert_eq!(error.error_class(), "http-error");
    }

    #[tokio::test]
    async fn missing_token_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let error = client(&server, false)
            .await
            .find_contact_by_email("a@example.com")
            .await
            .expect_err("no token");
        assert!(matches!(error, KommoError::NoToken(TokenError::NoCredentials)));
    }

    #[tokio::test]
    async fn custom_fields_are_listed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads/custom_fields"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": { "custom_fields": [
                    { "id": 2_099_073, "name": "WC Status", "type": "text", "code": null },
                    { "id": 2_098_971, "name": "Total", "type": "monetary" }
                ] }
            })))
            .mount(&server)
            .await;

        let fields = client(&server, true).await.lead_custom_fields().await.expect("fields");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].field_type, "monetary");
    }

    #[tokio::test]
    async fn contact_fields_use_contacts_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/contacts/custom_fields"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": { "custom_fields": [
                    { "id": 1_841_204, "name": "Email", "type": "multitext", "code": "EMAIL" }
                ] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let fields = client(&server, true).await.contact_custom_fields().await.expect("fields");
        assert_eq!(fields[0].code.as_deref(), Some("EMAIL"));
    }
}
