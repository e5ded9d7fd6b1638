//! Web push channel: fans one payload out to every stored subscription.

use std::sync::Arc;

use async_trait::async_trait;

use super::NotificationChannel;
use crate::Result;
use crate::notification::dispatcher::FanOutDispatcher;
use crate::notification::message::ContactNotification;

/// Web push notification channel.
pub struct WebPushChannel {
    dispatcher: Arc<FanOutDispatcher>,
}

impl WebPushChannel {
    pub fn new(dispatcher: Arc<FanOutDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl NotificationChannel for WebPushChannel {
    fn channel_type(&self) -> &'static str {
        "web_push"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, notification: &ContactNotification) -> Result<()> {
        let payload = notification.push_payload_bytes()?;
        self.dispatcher.dispatch(&payload).await?;
        Ok(())
    }
}
