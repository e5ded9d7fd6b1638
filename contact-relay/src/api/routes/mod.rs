//! API route modules.
//!
//! Organizes routes by resource type.

pub mod contact;
pub mod health;
pub mod push;

use axum::{Json, Router, middleware, routing::get};
use utoipa::OpenApi;

use crate::api::middleware::{IpRateLimiter, rate_limit};
use crate::api::openapi::ApiDoc;
use crate::api::server::AppState;

/// Create the main API router with all routes.
///
/// `/api/*` is rate limited when a limiter is given; `/health` never is.
pub fn create_router(state: AppState, rate_limiter: Option<IpRateLimiter>) -> Router {
    let mut api = Router::new()
        .merge(contact::router())
        .merge(push::router())
        .route("/openapi.json", get(openapi_json));

    if let Some(limiter) = rate_limiter {
        api = api.route_layer(middleware::from_fn_with_state(limiter, rate_limit));
    }

    Router::new()
        .nest("/api", api)
        .nest("/health", health::router())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
