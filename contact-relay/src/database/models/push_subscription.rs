//! Web push subscription database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::now_ms;

/// A browser push subscription.
///
/// `endpoint` is not unique; a browser that subscribes twice is stored twice.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PushSubscriptionDbModel {
    pub id: String,
    /// Push service URL the payload is POSTed to
    pub endpoint: String,
    /// Client ECDH public key (base64url, uncompressed P-256 point)
    pub p256dh: String,
    /// Client auth secret (base64url, 16 bytes)
    pub auth: String,
    /// Unix epoch milliseconds (UTC)
    pub created_at: i64,
}

impl PushSubscriptionDbModel {
    pub fn new(
        endpoint: impl Into<String>,
        p256dh: impl Into<String>,
        auth: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint: endpoint.into(),
            p256dh: p256dh.into(),
            auth: auth.into(),
            created_at: now_ms(),
        }
    }
}
