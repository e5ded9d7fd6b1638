//! Contact submission database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{ms_to_datetime, now_ms};

/// A persisted contact form submission.
///
/// Rows are written once and never updated.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ContactSubmissionDbModel {
    pub id: String,
    pub name: String,
    pub email: String,
    pub service: String,
    pub budget: String,
    pub deadline: String,
    pub message: String,
    /// Unix epoch milliseconds (UTC)
    pub created_at: i64,
}

impl ContactSubmissionDbModel {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        service: impl Into<String>,
        budget: impl Into<String>,
        deadline: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            email: email.into(),
            service: service.into(),
            budget: budget.into(),
            deadline: deadline.into(),
            message: message.into(),
            created_at: now_ms(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.created_at)
    }
}
