//! Desktop notification channel.
//!
//! Shells out to the platform notifier: `notify-send` on Linux and other
//! freedesktop systems, `osascript` on macOS.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::NotificationChannel;
use crate::notification::message::ContactNotification;
use crate::{Error, Result};

const APP_NAME: &str = "contact-relay";

/// Desktop channel configuration.
#[derive(Debug, Clone)]
pub struct DesktopConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Override for the notifier binary.
    pub program: Option<String>,
    /// Kill the notifier if it has not exited after this long.
    pub timeout: Duration,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl DesktopConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup("DESKTOP_NOTIFICATIONS").filter(|v| !v.trim().is_empty()) {
            config.enabled = crate::config::parse_bool("DESKTOP_NOTIFICATIONS", &raw)?;
        }
        config.program = lookup("DESKTOP_NOTIFY_COMMAND")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(config)
    }
}

/// Which notifier invocation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notifier {
    NotifySend,
    Osascript,
}

impl Notifier {
    fn for_current_platform() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(Self::Osascript)
        } else if cfg!(unix) {
            Some(Self::NotifySend)
        } else {
            None
        }
    }

    fn default_program(self) -> &'static str {
        match self {
            Self::NotifySend => "notify-send",
            Self::Osascript => "osascript",
        }
    }

    fn args(self, title: &str, body: &str) -> Vec<String> {
        match self {
            Self::NotifySend => vec![
                "--app-name".to_string(),
                APP_NAME.to_string(),
                title.to_string(),
                body.to_string(),
            ],
            Self::Osascript => vec![
                "-e".to_string(),
                format!(
                    "display notification \"{}\" with title \"{}\" sound name \"default\"",
                    applescript_escape(body),
                    applescript_escape(title)
                ),
            ],
        }
    }
}

fn applescript_escape(input: &str) -> String {
    input.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Desktop notification channel.
pub struct DesktopChannel {
    config: DesktopConfig,
    notifier: Option<Notifier>,
}

impl DesktopChannel {
    /// Create a new Desktop channel for the current platform.
    pub fn new(config: DesktopConfig) -> Self {
        Self {
            config,
            notifier: Notifier::for_current_platform(),
        }
    }

    fn build_command(&self, notification: &ContactNotification) -> Option<Command> {
        let notifier = self.notifier?;
        let program = self
            .config
            .program
            .as_deref()
            .unwrap_or(notifier.default_program());

        let mut command = Command::new(program);
        command
            .args(notifier.args(notification.title(), &notification.summary()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Some(command)
    }
}

#[async_trait]
impl NotificationChannel for DesktopChannel {
    fn channel_type(&self) -> &'static str {
        "desktop"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && self.notifier.is_some()
    }

    async fn send(&self, notification: &ContactNotification) -> Result<()> {
        let Some(mut command) = self.build_command(notification) else {
            debug!("No desktop notifier on this platform");
            return Ok(());
        };

        let output = tokio::time::timeout(self.config.timeout, command.output())
            .await
            .map_err(|_| {
                Error::Other(format!(
                    "Desktop notifier timed out after {:?}",
                    self.config.timeout
                ))
            })?
            .map_err(|e| Error::Other(format!("Failed to run desktop notifier: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Other(format!(
                "Desktop notifier exited with code {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(())
    }
}
