//! Web push fan-out with stale subscription pruning.
//!
//! [`FanOutDispatcher::dispatch`] sends one payload to every stored
//! subscription. Each attempt is classified independently:
//!
//! - success: counted as delivered;
//! - the push service reports the subscription gone (410, or 404 for
//!   unknown endpoints): the record is deleted and counted as pruned;
//! - anything else: logged, left in place, counted as failed.
//!
//! Only a failure to read the subscription snapshot is returned as an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::Result;
use crate::database::models::PushSubscriptionDbModel;
use crate::database::repositories::PushSubscriptionRepository;
use crate::notification::web_push::MAX_DELIVERY_TIME;

const DEFAULT_CONCURRENCY: usize = 16;
/// Leaves room for a full web push delivery including its one 429 retry.
const DEFAULT_ATTEMPT_TIMEOUT: Duration =
    Duration::from_secs(MAX_DELIVERY_TIME.as_secs() + 5);

/// Why a single delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("push service responded {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

impl DeliveryError {
    /// The push service says this subscription will never accept messages again.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Rejected { status: 404 | 410, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// One delivery attempt to one subscription.
#[async_trait]
pub trait PushDelivery: Send + Sync {
    async fn deliver(
        &self,
        subscription: &PushSubscriptionDbModel,
        payload: &[u8],
    ) -> std::result::Result<(), DeliveryError>;
}

/// Fan-out tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum attempts in flight at once.
    pub concurrency: usize,
    /// Upper bound for a single attempt, including any retry inside the client.
    pub attempt_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Per-run outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: usize,
    pub pruned: usize,
    pub failed: usize,
}

impl DispatchReport {
    /// Number of attempts made.
    pub fn total(&self) -> usize {
        self.delivered + self.pruned + self.failed
    }

    fn record(mut self, outcome: AttemptOutcome) -> Self {
        match outcome {
            AttemptOutcome::Delivered => self.delivered += 1,
            AttemptOutcome::Pruned => self.pruned += 1,
            AttemptOutcome::Failed => self.failed += 1,
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Delivered,
    Pruned,
    Failed,
}

/// Sends a payload to every stored subscription and prunes the dead ones.
pub struct FanOutDispatcher {
    subscriptions: Arc<dyn PushSubscriptionRepository>,
    client: Arc<dyn PushDelivery>,
    config: DispatcherConfig,
}

impl FanOutDispatcher {
    pub fn new(
        subscriptions: Arc<dyn PushSubscriptionRepository>,
        client: Arc<dyn PushDelivery>,
    ) -> Self {
        Self::with_config(subscriptions, client, DispatcherConfig::default())
    }

    pub fn with_config(
        subscriptions: Arc<dyn PushSubscriptionRepository>,
        client: Arc<dyn PushDelivery>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            subscriptions,
            client,
            config,
        }
    }

    /// Deliver `payload` to a snapshot of all current subscriptions.
    ///
    /// Subscriptions added while the run is in progress may or may not be
    /// included. Duplicate endpoints each receive their own delivery.
    pub async fn dispatch(&self, payload: &[u8]) -> Result<DispatchReport> {
        let subscriptions = self.subscriptions.list_all().await?;
        if subscriptions.is_empty() {
            debug!("No web push subscriptions; skipping fan-out");
            return Ok(DispatchReport::default());
        }

        let report = stream::iter(subscriptions)
            .map(|sub| self.attempt(sub, payload))
            .buffer_unordered(self.config.concurrency.max(1))
            .fold(DispatchReport::default(), |report, outcome| async move {
                report.record(outcome)
            })
            .await;

        info!(
            delivered = report.delivered,
            pruned = report.pruned,
            failed = report.failed,
            "Web push fan-out finished"
        );
        Ok(report)
    }

    async fn attempt(&self, sub: PushSubscriptionDbModel, payload: &[u8]) -> AttemptOutcome {
        let result = match tokio::time::timeout(
            self.config.attempt_timeout,
            self.client.deliver(&sub, payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.config.attempt_timeout)),
        };

        match result {
            Ok(()) => AttemptOutcome::Delivered,
            Err(e) if e.is_gone() => match self.subscriptions.delete(&sub.id).await {
                Ok(_) => {
                    info!(
                        id = %sub.id,
                        endpoint = %sub.endpoint,
                        status = ?e.status(),
                        "Deleted stale web push subscription"
                    );
                    AttemptOutcome::Pruned
                }
                Err(delete_err) => {
                    warn!(
                        id = %sub.id,
                        endpoint = %sub.endpoint,
                        error = %delete_err,
                        "Failed to delete stale web push subscription"
                    );
                    AttemptOutcome::Failed
                }
            },
            Err(e) => {
                warn!(
                    id = %sub.id,
                    endpoint = %sub.endpoint,
                    error = %e,
                    "Web push delivery failed"
                );
                AttemptOutcome::Failed
            }
        }
    }
}
