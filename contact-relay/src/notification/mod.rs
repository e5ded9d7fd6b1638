//! Notification system module.
//!
//! Relays each contact submission through independent channels (desktop,
//! email, web push). Sends run as tracked background tasks so a slow or
//! failing channel never holds up the HTTP response or the other channels.
//!
//! The web push path is the [`FanOutDispatcher`]: one delivery attempt per
//! stored subscription, pruning subscriptions the push service reports gone.

pub mod channels;
pub mod dispatcher;
pub mod message;
pub mod tasks;
pub mod web_push;

pub use channels::{
    DesktopChannel, DesktopConfig, EmailChannel, EmailConfig, Mailer, NotificationChannel,
    OutgoingEmail, SmtpMailer, WebPushChannel,
};
pub use dispatcher::{
    DeliveryError, DispatchReport, DispatcherConfig, FanOutDispatcher, PushDelivery,
};
pub use message::ContactNotification;
pub use tasks::NotificationTasks;
pub use web_push::{WebPushClient, WebPushConfig, generate_vapid_keys};
