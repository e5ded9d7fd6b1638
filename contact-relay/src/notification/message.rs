//! Notification content derived from a contact submission.
//!
//! Every channel renders from the same [`ContactNotification`], so the
//! desktop toast, the email and the push payload agree on title and summary.

use serde::Serialize;

use crate::Result;
use crate::database::models::ContactSubmissionDbModel;

/// Title shared by all channels.
pub const CONTACT_NOTIFICATION_TITLE: &str = "New Contact Form Submission";

/// Upper bound for a serialized push payload.
///
/// One aes128gcm record is 4096 bytes; after the header, tag and padding
/// delimiter this leaves headroom for the JSON envelope.
pub const MAX_PUSH_PAYLOAD_BYTES: usize = 3500;

const MAX_PUSH_TITLE_CHARS: usize = 120;
const MAX_PUSH_BODY_CHARS: usize = 600;

/// Owned copy of the submitted fields, cheap to move into background tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactNotification {
    pub name: String,
    pub email: String,
    pub service: String,
    pub budget: String,
    pub deadline: String,
    pub message: String,
}

impl From<&ContactSubmissionDbModel> for ContactNotification {
    fn from(submission: &ContactSubmissionDbModel) -> Self {
        Self {
            name: submission.name.clone(),
            email: submission.email.clone(),
            service: submission.service.clone(),
            budget: submission.budget.clone(),
            deadline: submission.deadline.clone(),
            message: submission.message.clone(),
        }
    }
}

/// JSON shape the service worker expects: `{title, body}`.
#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
}

impl ContactNotification {
    pub fn title(&self) -> &'static str {
        CONTACT_NOTIFICATION_TITLE
    }

    /// One-line summary: `From: {name} ({email})`.
    pub fn summary(&self) -> String {
        format!("From: {} ({})", self.name, self.email)
    }

    pub fn push_payload(&self) -> PushPayload {
        PushPayload {
            title: self.title().to_string(),
            body: self.summary(),
        }
    }

    /// Serialized push payload, truncated to fit a single push record.
    pub fn push_payload_bytes(&self) -> Result<Vec<u8>> {
        self.push_payload().into_bytes_capped(MAX_PUSH_PAYLOAD_BYTES)
    }

    pub fn email_subject(&self) -> &'static str {
        CONTACT_NOTIFICATION_TITLE
    }

    /// HTML email body listing every submitted field.
    ///
    /// With `escape` off, field values are embedded verbatim.
    pub fn email_html(&self, escape: bool) -> String {
        let field = |value: &str| {
            if escape {
                escape_html(value)
            } else {
                value.to_string()
            }
        };

        format!(
            "<h3>{}</h3>\n\
             <p><strong>Name:</strong> {}</p>\n\
             <p><strong>Email:</strong> {}</p>\n\
             <p><strong>Service:</strong> {}</p>\n\
             <p><strong>Budget:</strong> {}</p>\n\
             <p><strong>Deadline:</strong> {}</p>\n\
             <p><strong>Message:</strong><br>{}</p>",
            CONTACT_NOTIFICATION_TITLE,
            field(&self.name),
            field(&self.email),
            field(&self.service),
            field(&self.budget),
            field(&self.deadline),
            field(&self.message),
        )
    }
}

impl PushPayload {
    fn into_bytes_capped(mut self, max_bytes: usize) -> Result<Vec<u8>> {
        self.title = truncate_string(&self.title, MAX_PUSH_TITLE_CHARS);
        self.body = truncate_string(&self.body, MAX_PUSH_BODY_CHARS);

        let bytes = serde_json::to_vec(&self)?;
        if bytes.len() <= max_bytes {
            return Ok(bytes);
        }

        // Multi-byte characters can still blow the budget; fall back to a
        // short body rather than an undeliverable payload.
        let minimal = PushPayload {
            title: truncate_string(&self.title, 80),
            body: truncate_string(&self.body, 80),
        };
        Ok(serde_json::to_vec(&minimal)?)
    }
}

/// Truncate to `max_chars` characters, appending `…` when something was cut.
pub fn truncate_string(input: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let mut iter = input.chars();
    let mut out: String = iter.by_ref().take(max_chars).collect();
    if iter.next().is_some() {
        out.push('…');
    }
    out
}

/// Minimal HTML escaping for text nodes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> ContactNotification {
        ContactNotification {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            service: "web".to_string(),
            budget: "$5k".to_string(),
            deadline: "2 weeks".to_string(),
            message: "Hello".to_string(),
        }
    }

    #[test]
    fn test_summary() {
        assert_eq!(ada().summary(), "From: Ada (ada@example.com)");
    }

    #[test]
    fn test_push_payload_json_shape() {
        let bytes = ada().push_payload_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["title"], "New Contact Form Submission");
        assert_eq!(value["body"], "From: Ada (ada@example.com)");
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_push_payload_is_capped() {
        let mut n = ada();
        n.name = "é".repeat(10_000);
        let bytes = n.push_payload_bytes().unwrap();
        assert!(bytes.len() <= MAX_PUSH_PAYLOAD_BYTES);
    }

    #[test]
    fn test_email_html_contains_all_fields() {
        let html = ada().email_html(true);
        for needle in ["Ada", "ada@example.com", "web", "$5k", "2 weeks", "Hello"] {
            assert!(html.contains(needle), "missing {needle}");
        }
    }

    #[test]
    fn test_email_html_escaping_is_switchable() {
        let mut n = ada();
        n.message = "<script>alert(1)</script>".to_string();

        let escaped = n.email_html(true);
        assert!(!escaped.contains("<script>"));
        assert!(escaped.contains("&lt;script&gt;"));

        let verbatim = n.email_html(false);
        assert!(verbatim.contains("<script>alert(1)</script>"));
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello", 3), "hel…");
        assert_eq!(truncate_string("hello", 0), "");
    }
}
