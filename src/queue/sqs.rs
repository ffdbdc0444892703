//! AWS SQS implementation of [`QueueClient`].

use super::traits::{QueueClient, QueueMessage, ReceiveRequest};
use crate::config::QueueConfig;
use crate::error::{ConnectorError, QueueOperation};
use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::Message;

/// Request every message attribute so the `Topic` attribute comes back.
const MESSAGE_ATTRIBUTE_NAMES_ALL: &str = "All";

pub struct SqsQueueClient {
    client: aws_sdk_sqs::Client,
}

impl SqsQueueClient {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient AWS credential chain, pinned to the
    /// configured region and optional endpoint override.
    pub async fn from_config(config: &QueueConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(endpoint) = config.endpoint_url.as_deref() {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;
        Self::new(aws_sdk_sqs::Client::new(&sdk_config))
    }
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<QueueMessage>, ConnectorError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&request.queue_url)
            .max_number_of_messages(request.max_number_of_messages)
            .wait_time_seconds(request.wait_time_secs)
            .visibility_timeout(request.visibility_timeout_secs)
            .message_attribute_names(MESSAGE_ATTRIBUTE_NAMES_ALL)
            .send()
            .await
            .map_err(|e| {
                ConnectorError::queue(QueueOperation::Receive, DisplayErrorContext(&e).to_string())
            })?;

        Ok(output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(into_queue_message)
            .collect())
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), ConnectorError> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| {
                ConnectorError::queue(QueueOperation::Delete, DisplayErrorContext(&e).to_string())
            })
    }

    async fn change_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        timeout_secs: i32,
    ) -> Result<(), ConnectorError> {
        self.client
            .change_message_visibility()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(timeout_secs)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| {
                ConnectorError::queue(
                    QueueOperation::ChangeVisibility,
                    DisplayErrorContext(&e).to_string(),
                )
            })
    }
}

/// Keep only string-valued attributes; binary and number attributes never
/// carry a routing key.
fn into_queue_message(message: Message) -> QueueMessage {
    let attributes = message
        .message_attributes
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, value)| value.string_value.map(|v| (name, v)))
        .collect();

    QueueMessage {
        message_id: message.message_id,
        receipt_handle: message.receipt_handle,
        body: message.body,
        attributes,
    }
}
