//! Contact form submission.

use axum::{Json, Router, extract::State, routing::post};

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::JsonOrForm;
use crate::api::models::{ContactForm, MessageResponse};
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/contact", post(submit_contact))
}

/// Store a contact submission and relay it to the site owner.
///
/// Notifications run in the background; the response only reflects whether
/// the submission was stored.
#[utoipa::path(
    post,
    path = "/api/contact",
    tag = "contact",
    request_body(
        content(
            (ContactForm = "application/json"),
            (ContactForm = "application/x-www-form-urlencoded")
        )
    ),
    responses(
        (status = 200, description = "Submission stored", body = MessageResponse),
        (status = 422, description = "Invalid submission", body = crate::api::error::ApiErrorResponse),
        (status = 429, description = "Rate limited", body = crate::api::error::ApiErrorResponse),
        (status = 500, description = "Submission could not be stored", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn submit_contact(
    State(state): State<AppState>,
    JsonOrForm(form): JsonOrForm<ContactForm>,
) -> ApiResult<Json<MessageResponse>> {
    let service = state
        .contact_service
        .ok_or_else(|| ApiError::service_unavailable("Contact service not available"))?;

    service
        .handle_submission(form)
        .await
        .map_err(|e| ApiError::from_domain(e, "Server error"))?;

    Ok(Json(MessageResponse::new("Form submitted successfully!")))
}
