use super::context;
use crate::error::ConnectorError;
use crate::invoker::{InvocationOutcome, OutcomeSubscriber};
use crate::queue::QueueClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// Terminal queue mutation issued for an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Deleted,
    /// Delete was rejected; the message reappears after its visibility timeout.
    DeleteFailed,
    VisibilityReset,
    /// Reset was rejected; the message reappears after its visibility timeout.
    VisibilityResetFailed,
    /// No function subscribes to the topic; the message reappears after its
    /// visibility timeout.
    LeftToExpire,
}

/// Turns invocation outcomes into queue mutations: delete on success, make
/// visible again immediately on failure.
#[derive(Clone)]
pub struct ResponseProcessor {
    client: Arc<dyn QueueClient>,
    queue_url: String,
    tasks: TaskTracker,
    fatal: CancellationToken,
}

impl ResponseProcessor {
    /// `fatal` is cancelled when an outcome arrives without its correlation
    /// context; the daemon stops on it.
    pub fn new(
        client: Arc<dyn QueueClient>,
        queue_url: impl Into<String>,
        tasks: TaskTracker,
        fatal: CancellationToken,
    ) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            tasks,
            fatal,
        }
    }

    pub async fn resolve(&self, outcome: InvocationOutcome) -> Result<Resolution, ConnectorError> {
        let (span, _, receipt_handle) = context::unpack(outcome.context.as_ref())?;

        let resolution = async {
            if outcome.succeeded() {
                tracing::trace!(topic = %outcome.topic, status = outcome.status, "Message successfully processed");
                match self.client.delete(&self.queue_url, receipt_handle).await {
                    Ok(()) => {
                        tracing::trace!("Message successfully deleted from the queue");
                        Resolution::Deleted
                    }
                    Err(e) => {
                        tracing::warn!("Failed to delete message: {e}");
                        Resolution::DeleteFailed
                    }
                }
            } else if let Some(ConnectorError::Unrouted { topic }) = &outcome.error {
                tracing::warn!(
                    topic = %topic,
                    "No function subscribes to topic, leaving message until its visibility timeout expires"
                );
                Resolution::LeftToExpire
            } else {
                match &outcome.error {
                    Some(error) => tracing::warn!(
                        topic = %outcome.topic,
                        status = outcome.status,
                        "Failed to process message: {error}"
                    ),
                    None => tracing::warn!(
                        topic = %outcome.topic,
                        status = outcome.status,
                        "Failed to process message: function returned status {}",
                        outcome.status
                    ),
                }
                match self
                    .client
                    .change_visibility(&self.queue_url, receipt_handle, 0)
                    .await
                {
                    Ok(()) => {
                        tracing::trace!("Message visibility successfully changed");
                        Resolution::VisibilityReset
                    }
                    Err(e) => {
                        tracing::error!("Failed to change message visibility: {e}");
                        Resolution::VisibilityResetFailed
                    }
                }
            }
        }
        .instrument(span.clone())
        .await;

        Ok(resolution)
    }
}

impl OutcomeSubscriber for ResponseProcessor {
    /// Resolve on a detached task; nothing in the poll loop waits for it.
    fn on_outcome(&self, outcome: InvocationOutcome) {
        let processor = self.clone();
        self.tasks.spawn(async move {
            if let Err(e) = processor.resolve(outcome).await {
                tracing::error!("Cannot resolve invocation outcome: {e}");
                if e.is_fatal() {
                    processor.fatal.cancel();
                }
            }
        });
    }
}
