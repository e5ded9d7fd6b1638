//! Contact submission and push subscription handling.

pub mod form;
pub mod service;
pub mod subscription;

pub use form::{ContactForm, PushSubscriptionKeys, PushSubscriptionRequest};
pub use service::ContactService;
pub use subscription::SubscriptionService;
