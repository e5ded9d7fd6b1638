//! API request and response models (DTOs).
//!
//! Request bodies for the contact and subscribe endpoints live with their
//! validation rules in [`crate::contact::form`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use crate::contact::form::{ContactForm, PushSubscriptionKeys, PushSubscriptionRequest};

/// Generic message response for operations that return only a status message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    /// Status or result message
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    /// Crate version
    pub version: String,
    /// Server uptime in seconds
    pub uptime_secs: u64,
    /// Per-component status
    pub components: Vec<ComponentHealth>,
}

/// Health of one component.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Liveness check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LivenessResponse {
    /// Status indicator (always "alive" if responding)
    pub status: String,
    /// Server uptime in seconds
    pub uptime_secs: u64,
}
