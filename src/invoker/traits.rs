use crate::error::ConnectorError;
use crate::processors::CorrelationContext;
use async_trait::async_trait;

/// Result of invoking every function registered for a topic.
#[derive(Debug)]
pub struct InvocationOutcome {
    /// The context handed to [`Invoker::invoke`], returned unchanged.
    pub context: Option<CorrelationContext>,
    pub topic: String,
    /// HTTP status of the invocation; the highest one when several functions ran.
    pub status: u16,
    pub error: Option<ConnectorError>,
}

impl InvocationOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.status < 300
    }
}

/// Receives invocation outcomes. Called from whatever task finished the
/// invocation, so implementations must return quickly.
pub trait OutcomeSubscriber: Send + Sync {
    fn on_outcome(&self, outcome: InvocationOutcome);
}

/// Dispatches a payload to the function(s) registered for a topic.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Hand the payload off for invocation.
    ///
    /// Returns once the invocation is under way, not when it completes. Exactly
    /// one [`InvocationOutcome`] carrying `context` is later delivered to the
    /// registered [`OutcomeSubscriber`].
    async fn invoke(&self, context: CorrelationContext, topic: &str, payload: Vec<u8>);
}
