//! contact-relay library crate.
//!
//! Contact form backend: stores submissions in SQLite and relays each one by
//! email, desktop notification and web push. The binary in `main.rs` wires
//! these modules together; integration tests use them directly.

pub mod api;
pub mod config;
pub mod contact;
pub mod database;
pub mod error;
pub mod logging;
pub mod notification;
pub mod utils;

pub use error::{Error, Result};
