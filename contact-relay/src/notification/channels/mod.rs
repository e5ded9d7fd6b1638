//! Notification channels.
//!
//! Each contact submission is relayed through:
//! - Desktop notification (`notify-send` / `osascript`)
//! - Email (SMTP)
//! - Web push fan-out to every stored subscription

mod desktop;
mod email;
mod push;

pub use desktop::{DesktopChannel, DesktopConfig};
pub use email::{EmailChannel, EmailConfig, Mailer, OutgoingEmail, SmtpMailer};
pub use push::WebPushChannel;

use async_trait::async_trait;

use super::message::ContactNotification;
use crate::Result;

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Check if the channel is enabled.
    fn is_enabled(&self) -> bool;

    /// Send a notification through this channel.
    async fn send(&self, notification: &ContactNotification) -> Result<()>;
}
