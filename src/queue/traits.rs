use crate::error::ConnectorError;
use async_trait::async_trait;
use std::collections::HashMap;

/// A message received from the queue.
///
/// Identifier and receipt handle are optional because the SDK models them that
/// way; a message missing either is rejected when its correlation context is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: Option<String>,
    pub receipt_handle: Option<String>,
    pub body: Option<String>,
    /// String-valued message attributes, keyed by attribute name.
    pub attributes: HashMap<String, String>,
}

impl QueueMessage {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Parameters of a single long-poll receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub queue_url: String,
    pub max_number_of_messages: i32,
    pub wait_time_secs: i32,
    pub visibility_timeout_secs: i32,
}

/// Queue operations used by the connector.
///
/// Implementations are shared by the poll loop and every resolution task.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Long-poll for up to `max_number_of_messages` messages.
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<QueueMessage>, ConnectorError>;

    /// Permanently remove a message.
    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), ConnectorError>;

    /// Reset how long a received message stays hidden from other consumers.
    async fn change_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        timeout_secs: i32,
    ) -> Result<(), ConnectorError>;
}
