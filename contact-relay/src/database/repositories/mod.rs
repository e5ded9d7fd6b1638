//! Repository layer for database access.

pub mod contact;
pub mod push_subscription;

pub use contact::*;
pub use push_subscription::*;
