use super::context;
use crate::config::QueueConfig;
use crate::invoker::Invoker;
use crate::queue::{QueueClient, QueueMessage, ReceiveRequest};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Message attribute holding the routing key.
pub const TOPIC_ATTRIBUTE: &str = "Topic";

/// What a single poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCycle {
    ReceiveFailed,
    Empty,
    Dispatched(usize),
}

/// Reads messages off the queue and hands each one to the invoker.
pub struct MessageProcessor {
    client: Arc<dyn QueueClient>,
    invoker: Arc<dyn Invoker>,
    request: ReceiveRequest,
    in_flight: Arc<Semaphore>,
}

impl MessageProcessor {
    pub fn new(
        client: Arc<dyn QueueClient>,
        invoker: Arc<dyn Invoker>,
        config: &QueueConfig,
        in_flight: Arc<Semaphore>,
    ) -> Self {
        Self {
            client,
            invoker,
            request: ReceiveRequest {
                queue_url: config.url.clone(),
                max_number_of_messages: config.max_number_of_messages,
                wait_time_secs: config.max_wait_time_secs,
                visibility_timeout_secs: config.visibility_timeout_secs,
            },
            in_flight,
        }
    }

    /// Poll until `shutdown` fires.
    ///
    /// Shutdown is only observed while waiting on the queue; a batch that was
    /// received is always dispatched in full.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(queue_url = %self.request.queue_url, "Message processor started");
        loop {
            let received = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                received = self.client.receive(&self.request) => received,
            };
            self.handle_received(received).await;
        }
        tracing::info!("Message processor stopped");
    }

    /// Run one receive → dispatch cycle.
    pub async fn poll_once(&self) -> PollCycle {
        let received = self.client.receive(&self.request).await;
        self.handle_received(received).await
    }

    async fn handle_received(
        &self,
        received: Result<Vec<QueueMessage>, crate::error::ConnectorError>,
    ) -> PollCycle {
        match received {
            Err(e) => {
                // Nothing was received, so nothing is lost; the next cycle retries.
                tracing::error!("Failed to receive messages: {e}");
                PollCycle::ReceiveFailed
            }
            Ok(messages) if messages.is_empty() => PollCycle::Empty,
            Ok(messages) => {
                let count = messages.len();
                self.dispatch(messages).await;
                PollCycle::Dispatched(count)
            }
        }
    }

    /// Dispatch every message concurrently and return once all invoke calls
    /// have returned. Outcomes are resolved elsewhere and may arrive later.
    pub async fn dispatch(&self, messages: Vec<QueueMessage>) {
        let mut workers = JoinSet::new();
        for message in messages {
            let invoker = Arc::clone(&self.invoker);
            let in_flight = Arc::clone(&self.in_flight);
            let queue_url = self.request.queue_url.clone();
            workers.spawn(async move {
                dispatch_message(invoker.as_ref(), in_flight, &queue_url, message).await;
            });
        }

        while let Some(result) = workers.join_next().await {
            if let Err(error) = result {
                tracing::error!("Message dispatch task crashed: {error}");
            }
        }
    }
}

async fn dispatch_message(
    invoker: &dyn Invoker,
    in_flight: Arc<Semaphore>,
    queue_url: &str,
    message: QueueMessage,
) {
    let context = match context::build(&message) {
        Ok(context) => context,
        Err(e) => {
            tracing::error!("Skipping message until its visibility timeout expires: {e}");
            return;
        }
    };
    let span = context.span().clone();

    async move {
        if in_flight.available_permits() == 0 {
            tracing::debug!("In-flight invocation limit reached, waiting for a slot");
        }
        let Ok(permit) = in_flight.acquire_owned().await else {
            tracing::warn!("In-flight limiter closed, leaving message to expire");
            return;
        };

        let topic = routing_key(&message, queue_url);
        let payload = message.body.unwrap_or_default().into_bytes();
        tracing::trace!(topic = %topic, "Dispatching message");
        invoker
            .invoke(context.with_in_flight_permit(permit), &topic, payload)
            .await;
    }
    .instrument(span)
    .await;
}

/// The message's non-empty `Topic` attribute, or the queue URL.
pub fn routing_key(message: &QueueMessage, queue_url: &str) -> String {
    message
        .attribute(TOPIC_ATTRIBUTE)
        .filter(|topic| !topic.is_empty())
        .unwrap_or(queue_url)
        .to_string()
}
