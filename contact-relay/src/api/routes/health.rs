//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};

use crate::api::models::{ComponentHealth, HealthResponse, LivenessResponse};
use crate::api::server::AppState;
use crate::database;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

async fn database_health(state: &AppState) -> Option<ComponentHealth> {
    let pool = state.pool.as_ref()?;
    let health = match database::ping(pool).await {
        Ok(()) => ComponentHealth {
            name: "database".to_string(),
            status: "healthy".to_string(),
            message: None,
        },
        Err(e) => ComponentHealth {
            name: "database".to_string(),
            status: "unhealthy".to_string(),
            message: Some(e.to_string()),
        },
    };
    Some(health)
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let components: Vec<ComponentHealth> = database_health(&state).await.into_iter().collect();
    let healthy = components.iter().all(|c| c.status == "healthy");

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        components,
    })
}

/// Readiness check - is the service ready to accept traffic?
/// Returns HTTP 200 when the database answers, HTTP 503 otherwise.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Ready", body = String, content_type = "text/plain"),
        (status = 503, description = "Not ready", body = String, content_type = "text/plain")
    )
)]
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match database_health(&state).await {
        Some(component) if component.status != "healthy" => {
            (StatusCode::SERVICE_UNAVAILABLE, "not ready")
        }
        _ => (StatusCode::OK, "ready"),
    }
}

/// Liveness check - is the service alive?
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Alive", body = LivenessResponse)
    )
)]
pub async fn liveness_check(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
