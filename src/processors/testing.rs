//! In-memory queue and invoker doubles shared by the processor tests.

use super::context::CorrelationContext;
use crate::error::{ConnectorError, QueueOperation};
use crate::invoker::Invoker;
use crate::queue::{QueueClient, QueueMessage, ReceiveRequest};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) fn message(id: &str, topic: Option<&str>, body: Option<&str>) -> QueueMessage {
    let mut attributes = HashMap::new();
    if let Some(topic) = topic {
        attributes.insert("Topic".to_string(), topic.to_string());
    }
    QueueMessage {
        message_id: Some(id.to_string()),
        receipt_handle: Some(format!("rh-{id}")),
        body: body.map(str::to_string),
        attributes,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mutation {
    Delete {
        queue_url: String,
        receipt_handle: String,
    },
    ChangeVisibility {
        queue_url: String,
        receipt_handle: String,
        timeout_secs: i32,
    },
}

type ScriptedReceive = Result<Vec<QueueMessage>, ConnectorError>;

#[derive(Default)]
pub(crate) struct MockQueue {
    script: Mutex<VecDeque<ScriptedReceive>>,
    requests: Mutex<Vec<ReceiveRequest>>,
    mutations: Mutex<Vec<Mutation>>,
    observe: Option<Arc<AtomicUsize>>,
    observed: Mutex<Vec<usize>>,
    cancel_when_drained: Option<CancellationToken>,
    fail_delete: bool,
    fail_change_visibility: bool,
}

impl MockQueue {
    pub fn new(script: Vec<ScriptedReceive>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Snapshot `counter` on every receive call.
    pub fn observing(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.observe = Some(counter);
        self
    }

    /// Cancel `token` once the last scripted receive has been served.
    pub fn cancel_when_drained(mut self, token: CancellationToken) -> Self {
        self.cancel_when_drained = Some(token);
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn failing_change_visibility(mut self) -> Self {
        self.fail_change_visibility = true;
        self
    }

    pub fn receive_requests(&self) -> Vec<ReceiveRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn observed_at_receive(&self) -> Vec<usize> {
        self.observed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueClient for MockQueue {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<QueueMessage>, ConnectorError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(counter) = &self.observe {
            self.observed
                .lock()
                .unwrap()
                .push(counter.load(Ordering::SeqCst));
        }

        let (next, drained) = {
            let mut script = self.script.lock().unwrap();
            let next = script.pop_front();
            (next, script.is_empty())
        };
        if drained {
            if let Some(token) = &self.cancel_when_drained {
                token.cancel();
            }
        }
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), ConnectorError> {
        self.mutations.lock().unwrap().push(Mutation::Delete {
            queue_url: queue_url.to_string(),
            receipt_handle: receipt_handle.to_string(),
        });
        if self.fail_delete {
            return Err(ConnectorError::queue(QueueOperation::Delete, "access denied"));
        }
        Ok(())
    }

    async fn change_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        timeout_secs: i32,
    ) -> Result<(), ConnectorError> {
        self.mutations.lock().unwrap().push(Mutation::ChangeVisibility {
            queue_url: queue_url.to_string(),
            receipt_handle: receipt_handle.to_string(),
            timeout_secs,
        });
        if self.fail_change_visibility {
            return Err(ConnectorError::queue(
                QueueOperation::ChangeVisibility,
                "receipt handle expired",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct InvokeCall {
    pub message_id: String,
    pub receipt_handle: String,
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Records invocations and keeps their contexts without producing outcomes.
#[derive(Default)]
pub(crate) struct RecordingInvoker {
    delay: Option<Duration>,
    calls: Mutex<Vec<InvokeCall>>,
    contexts: Mutex<Vec<CorrelationContext>>,
    pub returned: Arc<AtomicUsize>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<InvokeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn held_contexts(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    pub fn release_contexts(&self) {
        self.contexts.lock().unwrap().clear();
    }
}

#[async_trait]
impl Invoker for RecordingInvoker {
    async fn invoke(&self, context: CorrelationContext, topic: &str, payload: Vec<u8>) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(InvokeCall {
            message_id: context.message_id().to_string(),
            receipt_handle: context.receipt_handle().to_string(),
            topic: topic.to_string(),
            payload,
        });
        self.contexts.lock().unwrap().push(context);
        self.returned.fetch_add(1, Ordering::SeqCst);
    }
}
