//! Tracked background tasks for best-effort notifications.
//!
//! Notification sends never block the HTTP response, but they are not
//! detached either: every task is registered with a [`TaskTracker`] so the
//! process can wait for in-flight sends before exiting.

use std::future::Future;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, warn};

use crate::Result;

/// Handle for spawning notification work that outlives the request.
#[derive(Debug, Clone, Default)]
pub struct NotificationTasks {
    tracker: TaskTracker,
}

impl NotificationTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a notification future. Errors are logged, never propagated.
    pub fn spawn<F>(&self, channel: &'static str, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let span = tracing::info_span!("notify", channel);
        self.tracker.spawn(
            async move {
                match fut.await {
                    Ok(()) => debug!("Notification sent"),
                    Err(e) => warn!(error = %e, "Notification failed"),
                }
            }
            .instrument(span),
        );
    }

    /// Number of tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for all in-flight tasks, up to `grace`.
    ///
    /// Returns `true` when everything finished in time. New tasks may still be
    /// spawned afterwards; they are tracked but no longer awaited by this call.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "Waiting for in-flight notifications");
        }

        let finished = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();
        if !finished {
            warn!(
                remaining = self.tracker.len(),
                "Gave up waiting for in-flight notifications"
            );
        }
        self.tracker.reopen();
        finished
    }
}
