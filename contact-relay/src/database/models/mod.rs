//! Database models for contact-relay.
//!
//! These models map directly to the database schema.

pub mod contact;
pub mod push_subscription;

pub use contact::*;
pub use push_subscription::*;
