//! Web push subscription endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::JsonOrForm;
use crate::api::models::{MessageResponse, PushSubscriptionRequest};
use crate::api::server::AppState;

/// Body of the 500 returned when push is not configured.
pub const VAPID_NOT_CONFIGURED: &str = "VAPID public key is not configured";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/vapidPublicKey", get(vapid_public_key))
        .route("/subscribe", post(subscribe))
}

/// VAPID application server key for `pushManager.subscribe()`.
#[utoipa::path(
    get,
    path = "/api/vapidPublicKey",
    tag = "push",
    responses(
        (status = 200, description = "Base64url VAPID public key", body = String, content_type = "text/plain"),
        (status = 500, description = "Push is not configured", body = String, content_type = "text/plain")
    )
)]
pub async fn vapid_public_key(State(state): State<AppState>) -> Response {
    let plain = [(header::CONTENT_TYPE, "text/plain; charset=utf-8")];
    match state.vapid_public_key {
        Some(key) => (StatusCode::OK, plain, key.to_string()).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, plain, VAPID_NOT_CONFIGURED).into_response(),
    }
}

/// Register a browser push subscription.
#[utoipa::path(
    post,
    path = "/api/subscribe",
    tag = "push",
    request_body = PushSubscriptionRequest,
    responses(
        (status = 201, description = "Subscription stored", body = MessageResponse),
        (status = 422, description = "Invalid subscription", body = crate::api::error::ApiErrorResponse),
        (status = 429, description = "Rate limited", body = crate::api::error::ApiErrorResponse),
        (status = 500, description = "Subscription could not be stored", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn subscribe(
    State(state): State<AppState>,
    JsonOrForm(request): JsonOrForm<PushSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let service = state
        .subscription_service
        .ok_or_else(|| ApiError::service_unavailable("Subscription service not available"))?;

    service
        .subscribe(request)
        .await
        .map_err(|e| ApiError::from_domain(e, "Failed to save subscription"))?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Subscribed successfully!")),
    ))
}
