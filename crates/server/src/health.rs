use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use dialout_core::config::AppConfig;

#[derive(Clone)]
pub struct HealthState {
    config: AppConfig,
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
    pub dispatch_credentials: HealthCheck,
    pub checked_at: String,
}

pub fn router(config: AppConfig) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { config })
}

pub async fn spawn(bind_address: &str, port: u16, config: AppConfig) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        channel = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(config)).await {
            error!(
                event_name = "system.health.error",
                channel = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let dispatch_credentials = credentials_check(&state.config);
    let ready = dispatch_credentials.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "dialout-server runtime initialized".to_string(),
        },
        dispatch_credentials,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn credentials_check(config: &AppConfig) -> HealthCheck {
    let missing = config.missing_dispatch_credentials();
    if missing.is_empty() {
        HealthCheck { status: "ready", detail: "all dispatch credentials present".to_string() }
    } else {
        HealthCheck {
            status: "degraded",
            detail: format!("missing dispatch credentials: {}", missing.join(", ")),
        }
    }
}
