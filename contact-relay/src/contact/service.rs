//! Submission handling: persist first, then notify in the background.

use std::sync::Arc;

use tracing::{debug, info};

use super::form::ContactForm;
use crate::Result;
use crate::database::models::ContactSubmissionDbModel;
use crate::database::repositories::ContactRepository;
use crate::database::retry::retry_on_busy;
use crate::notification::{ContactNotification, NotificationChannel, NotificationTasks};

/// Accepts contact submissions.
///
/// A submission is acknowledged once it is stored. Every enabled channel then
/// gets its own background task; none of them can fail the submission.
pub struct ContactService {
    contacts: Arc<dyn ContactRepository>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    tasks: NotificationTasks,
}

impl ContactService {
    pub fn new(contacts: Arc<dyn ContactRepository>, tasks: NotificationTasks) -> Self {
        Self {
            contacts,
            channels: Vec::new(),
            tasks,
        }
    }

    /// Add a notification channel.
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Background task tracker used for notifications.
    pub fn tasks(&self) -> &NotificationTasks {
        &self.tasks
    }

    /// Validate, persist and schedule notifications.
    ///
    /// Returns the stored record. Only validation and store errors are returned.
    pub async fn handle_submission(&self, form: ContactForm) -> Result<ContactSubmissionDbModel> {
        form.validate()?;

        let submission = form.into_model();
        retry_on_busy("insert contact submission", || {
            self.contacts.create(&submission)
        })
        .await?;

        info!(id = %submission.id, email = %submission.email, "Stored contact submission");

        self.notify(&submission);
        Ok(submission)
    }

    fn notify(&self, submission: &ContactSubmissionDbModel) {
        let notification = Arc::new(ContactNotification::from(submission));

        for channel in &self.channels {
            if !channel.is_enabled() {
                debug!(channel = channel.channel_type(), "Channel disabled; skipping");
                continue;
            }

            let channel = Arc::clone(channel);
            let notification = Arc::clone(&notification);
            self.tasks.spawn(channel.channel_type(), async move {
                channel.send(&notification).await
            });
        }
    }
}
