//! Email notification channel using SMTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::debug;

use super::NotificationChannel;
use crate::notification::message::ContactNotification;
use crate::{Error, Result};

/// Port that speaks implicit TLS. Anything else upgrades with STARTTLS.
const SMTPS_PORT: u16 = 465;
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Email channel configuration.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server host.
    pub smtp_host: String,
    /// SMTP server port.
    pub smtp_port: u16,
    /// Account used to log in; also the sender and the recipient.
    pub username: Option<String>,
    /// SMTP password.
    pub password: Option<String>,
    /// Display name of the sender.
    pub from_name: String,
    /// Escape submitted fields before embedding them in the HTML body.
    pub escape_html: bool,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from_name", &self.from_name)
            .field("escape_html", &self.escape_html)
            .finish()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: SMTPS_PORT,
            username: None,
            password: None,
            from_name: "Contact Form".to_string(),
            escape_html: true,
        }
    }
}

impl EmailConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let smtp_port = match get("SMTP_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| Error::config(format!("SMTP_PORT must be a port number, got '{}'", raw)))?,
            None => defaults.smtp_port,
        };

        let escape_html = match get("EMAIL_ESCAPE_HTML") {
            Some(raw) => crate::config::parse_bool("EMAIL_ESCAPE_HTML", &raw)?,
            None => defaults.escape_html,
        };

        Ok(Self {
            smtp_host: get("SMTP_HOST").unwrap_or(defaults.smtp_host),
            smtp_port,
            username: get("EMAIL_USER"),
            password: lookup("EMAIL_PASSWORD").filter(|v| !v.is_empty()),
            from_name: get("EMAIL_FROM_NAME").unwrap_or(defaults.from_name),
            escape_html,
        })
    }

    /// Credentials are present.
    pub fn is_configured(&self) -> bool {
        self.username.is_some() && self.password.is_some() && !self.smtp_host.is_empty()
    }
}

/// A rendered email ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from_name: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// SMTP transport backed by lettre.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let (Some(username), Some(password)) = (&config.username, &config.password) else {
            return Err(Error::mail("EMAIL_USER and EMAIL_PASSWORD must be set"));
        };

        crate::utils::http_client::install_rustls_provider();

        let builder = if config.smtp_port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| Error::mail(format!("Invalid SMTP relay {}: {}", config.smtp_host, e)))?;

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(username.clone(), password.clone()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self { transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let message = build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| Error::mail(format!("SMTP send failed: {}", e)))?;
        Ok(())
    }
}

fn build_message(email: OutgoingEmail) -> Result<Message> {
    let from_address: Address = email
        .from
        .parse()
        .map_err(|e| Error::mail(format!("Invalid sender address '{}': {}", email.from, e)))?;
    let to_address: Address = email
        .to
        .parse()
        .map_err(|e| Error::mail(format!("Invalid recipient address '{}': {}", email.to, e)))?;

    Message::builder()
        .from(Mailbox::new(Some(email.from_name), from_address))
        .to(Mailbox::new(None, to_address))
        .subject(email.subject)
        .header(ContentType::TEXT_HTML)
        .body(email.html)
        .map_err(|e| Error::mail(format!("Failed to build email: {}", e)))
}

/// Email notification channel.
pub struct EmailChannel {
    config: EmailConfig,
    mailer: Arc<dyn Mailer>,
}

impl EmailChannel {
    /// Create a new Email channel.
    pub fn new(config: EmailConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self { config, mailer }
    }

    /// Render the email for a submission. Sent from and to the configured account.
    pub fn build_email(&self, notification: &ContactNotification) -> Result<OutgoingEmail> {
        let account = self
            .config
            .username
            .clone()
            .ok_or_else(|| Error::mail("EMAIL_USER is not configured"))?;

        Ok(OutgoingEmail {
            from_name: self.config.from_name.clone(),
            from: account.clone(),
            to: account,
            subject: notification.email_subject().to_string(),
            html: notification.email_html(self.config.escape_html),
        })
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn channel_type(&self) -> &'static str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    async fn send(&self, notification: &ContactNotification) -> Result<()> {
        let email = self.build_email(notification)?;
        debug!(to = %email.to, "Sending email notification");
        self.mailer.send(email).await
    }
}
