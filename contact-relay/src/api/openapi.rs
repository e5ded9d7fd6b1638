//! OpenAPI documentation configuration.
//!
//! The generated document is served at `/api/openapi.json`.

use utoipa::OpenApi;

use crate::api::error::ApiErrorResponse;
use crate::api::models::{
    ComponentHealth, ContactForm, HealthResponse, LivenessResponse, MessageResponse,
    PushSubscriptionKeys, PushSubscriptionRequest,
};

/// OpenAPI documentation for the contact-relay API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "contact-relay API",
        version = "0.1.0",
        description = "Contact form backend. Stores submissions and relays them by email, desktop notification and web push.",
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "health", description = "Health check endpoints for monitoring and orchestration"),
        (name = "contact", description = "Contact form submission"),
        (name = "push", description = "Web push subscription endpoints")
    ),
    paths(
        crate::api::routes::health::health_check,
        crate::api::routes::health::readiness_check,
        crate::api::routes::health::liveness_check,
        crate::api::routes::contact::submit_contact,
        crate::api::routes::push::vapid_public_key,
        crate::api::routes::push::subscribe,
    ),
    components(schemas(
        ApiErrorResponse,
        ComponentHealth,
        ContactForm,
        HealthResponse,
        LivenessResponse,
        MessageResponse,
        PushSubscriptionKeys,
        PushSubscriptionRequest,
    ))
)]
pub struct ApiDoc;
