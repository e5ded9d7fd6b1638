//! Process configuration, read once at startup from the environment.
//!
//! Values come from real environment variables and a `.env` file loaded by
//! `dotenvy` in `main`. Every section can also be built from an arbitrary
//! lookup function, which is how the tests drive it.

use std::path::PathBuf;

use crate::api::ApiServerConfig;
use crate::notification::{DesktopConfig, EmailConfig, WebPushConfig};
use crate::{Error, Result};

/// Default SQLite database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:contact-relay.db?mode=rwc";

/// Default log directory.
pub const DEFAULT_LOG_DIR: &str = "./logs";

/// All configuration sections.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ApiServerConfig,
    pub database_url: String,
    pub log_dir: PathBuf,
    pub email: EmailConfig,
    /// `None` when push is disabled, either unset or invalid.
    pub web_push: Option<WebPushConfig>,
    pub desktop: DesktopConfig,
    /// Problems that disabled a feature without stopping startup.
    ///
    /// Logging is not up yet while the config is read, so these are reported
    /// by the caller once it is.
    pub warnings: Vec<String>,
}

impl AppConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut warnings = Vec::new();

        let web_push = match WebPushConfig::from_lookup(&lookup) {
            Ok(config) => config,
            Err(e) => {
                warnings.push(format!("Web push disabled: {}", e));
                None
            }
        };

        let email = EmailConfig::from_lookup(&lookup)?;
        if !email.is_configured() {
            warnings.push("Email notifications disabled: EMAIL_USER and EMAIL_PASSWORD are not set".to_string());
        }

        Ok(Self {
            server: ApiServerConfig::from_lookup(&lookup)?,
            database_url: non_empty("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            log_dir: PathBuf::from(non_empty("LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())),
            email,
            web_push,
            desktop: DesktopConfig::from_lookup(&lookup)?,
            warnings,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Parse a boolean flag: `true/false`, `1/0`, `yes/no`, `on/off`.
pub fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!(
            "{} must be a boolean, got '{}'",
            name, raw
        ))),
    }
}
