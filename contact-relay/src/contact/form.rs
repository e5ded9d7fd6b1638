//! Inbound form payloads and their validation rules.

use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::database::models::{ContactSubmissionDbModel, PushSubscriptionDbModel};
use crate::{Error, Result};

const MAX_NAME_CHARS: usize = 200;
const MAX_EMAIL_CHARS: usize = 254;
const MAX_SHORT_FIELD_CHARS: usize = 200;
const MAX_MESSAGE_CHARS: usize = 10_000;
const MAX_ENDPOINT_CHARS: usize = 2048;
const MAX_KEY_CHARS: usize = 256;

/// Contact form as posted by the page. Missing fields default to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub service: String,
    pub budget: String,
    pub deadline: String,
    pub message: String,
}

impl ContactForm {
    /// Name and email are required; every field is length-bounded.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Name is required"));
        }
        if self.email.trim().is_empty() {
            return Err(Error::validation("Email is required"));
        }
        if !looks_like_email(self.email.trim()) {
            return Err(Error::validation("Email address is invalid"));
        }

        check_len("name", &self.name, MAX_NAME_CHARS)?;
        check_len("email", &self.email, MAX_EMAIL_CHARS)?;
        check_len("service", &self.service, MAX_SHORT_FIELD_CHARS)?;
        check_len("budget", &self.budget, MAX_SHORT_FIELD_CHARS)?;
        check_len("deadline", &self.deadline, MAX_SHORT_FIELD_CHARS)?;
        check_len("message", &self.message, MAX_MESSAGE_CHARS)?;
        Ok(())
    }

    pub fn into_model(self) -> ContactSubmissionDbModel {
        ContactSubmissionDbModel::new(
            self.name,
            self.email,
            self.service,
            self.budget,
            self.deadline,
            self.message,
        )
    }
}

/// Key material of a browser `PushSubscription`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PushSubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// `PushSubscription.toJSON()` as sent by the service worker registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PushSubscriptionRequest {
    pub endpoint: String,
    pub keys: PushSubscriptionKeys,
}

impl PushSubscriptionRequest {
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(Error::validation("Subscription endpoint is required"));
        }
        check_len("endpoint", endpoint, MAX_ENDPOINT_CHARS)?;
        match Url::parse(endpoint) {
            Ok(url) if matches!(url.scheme(), "https" | "http") && url.host().is_some() => {}
            _ => return Err(Error::validation("Subscription endpoint must be an http(s) URL")),
        }

        if self.keys.p256dh.trim().is_empty() || self.keys.auth.trim().is_empty() {
            return Err(Error::validation(
                "Subscription keys p256dh and auth are required",
            ));
        }
        check_len("keys.p256dh", &self.keys.p256dh, MAX_KEY_CHARS)?;
        check_len("keys.auth", &self.keys.auth, MAX_KEY_CHARS)?;
        Ok(())
    }

    pub fn into_model(self) -> PushSubscriptionDbModel {
        PushSubscriptionDbModel::new(
            self.endpoint.trim(),
            self.keys.p256dh.trim(),
            self.keys.auth.trim(),
        )
    }
}

fn check_len(field: &str, value: &str, max_chars: usize) -> Result<()> {
    if value.chars().count() > max_chars {
        return Err(Error::validation(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    Ok(())
}

/// `local@domain` with no whitespace and a single `@`.
fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}
