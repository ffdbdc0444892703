use super::topic_map::TopicMap;
use super::traits::{InvocationOutcome, Invoker, OutcomeSubscriber};
use crate::config::GatewayConfig;
use crate::error::ConnectorError;
use crate::processors::CorrelationContext;
use crate::util::truncate_with_ellipsis;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// Header telling the function which topic triggered it.
const TOPIC_HEADER: &str = "X-Topic";
/// Response bodies are only logged at debug level, and only this much of them.
const MAX_LOGGED_BODY_CHARS: usize = 512;
/// Status reported when no function is registered for a topic.
const NO_FUNCTIONS_STATUS: u16 = 404;

/// HTTP basic-auth credentials for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

impl BasicAuth {
    pub fn from_config(config: &GatewayConfig) -> Option<Self> {
        config.username.as_ref().map(|username| Self {
            username: username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn apply(auth: Option<&Self>, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match auth {
            Some(auth) => request.basic_auth(&auth.username, auth.password.as_deref()),
            None => request,
        }
    }
}

/// Build the gateway HTTP client; falls back to a default client when the
/// configured one cannot be built.
pub fn build_gateway_client(config: &GatewayConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()
        .unwrap_or_else(|error| {
            tracing::warn!("Failed to build gateway client with timeouts: {error}");
            reqwest::Client::new()
        })
}

/// Invokes functions through an OpenFaaS-style gateway
/// (`POST {gateway}/function/{name}`).
pub struct GatewayInvoker {
    client: reqwest::Client,
    gateway_url: String,
    content_type: String,
    auth: Option<BasicAuth>,
    topics: Arc<TopicMap>,
    subscriber: Arc<dyn OutcomeSubscriber>,
    tasks: TaskTracker,
}

impl GatewayInvoker {
    pub fn new(
        config: &GatewayConfig,
        client: reqwest::Client,
        topics: Arc<TopicMap>,
        subscriber: Arc<dyn OutcomeSubscriber>,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            client,
            gateway_url: config.url.trim_end_matches('/').to_string(),
            content_type: config.content_type.clone(),
            auth: BasicAuth::from_config(config),
            topics,
            subscriber,
            tasks,
        }
    }
}

#[async_trait]
impl Invoker for GatewayInvoker {
    async fn invoke(&self, context: CorrelationContext, topic: &str, payload: Vec<u8>) {
        let call = FunctionCall {
            client: self.client.clone(),
            gateway_url: self.gateway_url.clone(),
            content_type: self.content_type.clone(),
            auth: self.auth.clone(),
            topic: topic.to_string(),
        };
        let functions = self.topics.functions_for(topic);
        let subscriber = Arc::clone(&self.subscriber);
        let span = context.span().clone();

        self.tasks.spawn(
            async move {
                let (status, error) = call.invoke_all(&functions, payload).await;
                subscriber.on_outcome(InvocationOutcome {
                    context: Some(context),
                    topic: call.topic,
                    status,
                    error,
                });
            }
            .instrument(span),
        );
    }
}

struct FunctionCall {
    client: reqwest::Client,
    gateway_url: String,
    content_type: String,
    auth: Option<BasicAuth>,
    topic: String,
}

impl FunctionCall {
    /// Invoke every function concurrently and fold the results into one
    /// status: the first transport error wins, otherwise the highest status.
    async fn invoke_all(&self, functions: &[String], payload: Vec<u8>) -> (u16, Option<ConnectorError>) {
        if functions.is_empty() {
            return (
                NO_FUNCTIONS_STATUS,
                Some(ConnectorError::Unrouted {
                    topic: self.topic.clone(),
                }),
            );
        }

        let calls = functions
            .iter()
            .map(|name| self.invoke_function(name, payload.clone()));
        let results = futures_util::future::join_all(calls).await;

        let mut status = 0;
        let mut error = None;
        for result in results {
            match result {
                Ok(code) => status = status.max(code),
                Err(e) => {
                    if error.is_none() {
                        error = Some(e);
                    }
                }
            }
        }
        (status, error)
    }

    async fn invoke_function(&self, name: &str, payload: Vec<u8>) -> Result<u16, ConnectorError> {
        let url = format!("{}/function/{name}", self.gateway_url);
        let response = BasicAuth::apply(self.auth.as_ref(), self.client.post(&url))
            .header(CONTENT_TYPE, &self.content_type)
            .header(TOPIC_HEADER, &self.topic)
            .body(payload)
            .send()
            .await
            .map_err(|e| ConnectorError::invocation(&self.topic, format!("{name}: {e}")))?;

        let status = response.status().as_u16();
        if tracing::enabled!(tracing::Level::DEBUG) {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(
                function = name,
                status,
                body = %truncate_with_ellipsis(&body, MAX_LOGGED_BODY_CHARS),
                "Function responded"
            );
        }
        Ok(status)
    }
}
