//! Push subscription registration.

use std::sync::Arc;

use tracing::info;

use super::form::PushSubscriptionRequest;
use crate::Result;
use crate::database::models::PushSubscriptionDbModel;
use crate::database::repositories::PushSubscriptionRepository;
use crate::database::retry::retry_on_busy;

/// Stores browser push subscriptions as given. Duplicates are kept.
pub struct SubscriptionService {
    subscriptions: Arc<dyn PushSubscriptionRepository>,
}

impl SubscriptionService {
    pub fn new(subscriptions: Arc<dyn PushSubscriptionRepository>) -> Self {
        Self { subscriptions }
    }

    pub async fn subscribe(&self, request: PushSubscriptionRequest) -> Result<PushSubscriptionDbModel> {
        request.validate()?;

        let subscription = request.into_model();
        retry_on_busy("insert push subscription", || {
            self.subscriptions.create(&subscription)
        })
        .await?;

        info!(id = %subscription.id, endpoint = %subscription.endpoint, "Stored push subscription");
        Ok(subscription)
    }
}
