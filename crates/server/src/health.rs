use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use kommo_sync_db::DbPool;
use kommo_sync_kommo::TokenManager;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    tokens: Arc<TokenManager>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    /// Informational only; an unauthorized CRM link does not make the service unready.
    pub kommo: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, tokens: Arc<TokenManager>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, tokens })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    db_pool: DbPool,
    tokens: Arc<TokenManager>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool, tokens)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";
    let kommo = kommo_check(&state.tokens).await;

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "kommo-sync-server runtime initialized".to_string(),
        },
        database,
        kommo,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn kommo_check(tokens: &TokenManager) -> HealthCheck {
    match tokens.status().await {
        Ok(status) if !status.missing_settings.is_empty() => HealthCheck {
            status: "unconfigured",
            detail: format!("missing settings: {}", status.missing_settings.join(", ")),
        },
        Ok(status) => HealthCheck {
            status: status.phase.as_str(),
            detail: match status.expires_at {
                Some(expires_at) => format!("access token expires at {expires_at}"),
                None => "no access token stored".to_string(),
            },
        },
        Err(error) => {
            HealthCheck { status: "unknown", detail: format!("token state unavailable: {error}") }
        }
    }
}
