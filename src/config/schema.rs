use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// SQS accepts between 1 and 10 messages per receive call.
const SQS_MAX_BATCH_SIZE: i32 = 10;
/// SQS long polling waits at most 20 seconds.
const SQS_MAX_WAIT_TIME_SECS: i32 = 20;
/// SQS visibility timeout is capped at 12 hours.
const SQS_MAX_VISIBILITY_TIMEOUT_SECS: i32 = 43_200;

/// Largest permit count the in-flight semaphore accepts.
const MAX_IN_FLIGHT: usize = tokio::sync::Semaphore::MAX_PERMITS;

const REDACTED: &str = "***";

/// Top-level connector configuration.
///
/// Resolution order: TOML file (when given), environment overrides, CLI
/// flags, then [`Config::validate`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Config {
    /// Log filter used when `RUST_LOG` is unset (e.g. `info`, `debug`, `sqs_connector=trace`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Source queue (`[queue]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct QueueConfig {
    /// URL of the SQS queue to pop messages from. Also the routing key of
    /// messages without a `Topic` attribute.
    #[serde(default)]
    pub url: String,
    /// AWS region the queue belongs to.
    #[serde(default)]
    pub region: String,
    /// Custom SQS endpoint, e.g. a local emulator.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Maximum number of messages returned per receive call (1-10).
    #[serde(default = "default_max_number_of_messages")]
    pub max_number_of_messages: i32,
    /// Long-poll wait per receive call, in seconds (0-20).
    #[serde(default = "default_max_wait_time_secs")]
    pub max_wait_time_secs: i32,
    /// How long received messages stay hidden from other consumers, in seconds.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: i32,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_max_number_of_messages() -> i32 {
    1
}

fn default_max_wait_time_secs() -> i32 {
    1
}

fn default_visibility_timeout_secs() -> i32 {
    30
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            region: String::new(),
            endpoint_url: None,
            max_number_of_messages: default_max_number_of_messages(),
            max_wait_time_secs: default_max_wait_time_secs(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
        }
    }
}

/// Function gateway (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base URL of the gateway.
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// Interval at which the topic → function map is rebuilt, in seconds.
    #[serde(default = "default_topic_refresh_interval_secs")]
    pub topic_refresh_interval_secs: u64,
    /// Total timeout of a single function call, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// `Content-Type` sent with every invocation.
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Basic-auth user for the gateway.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_gateway_url() -> String {
    "http://gateway.openfaas.svc:8080".into()
}

fn default_topic_refresh_interval_secs() -> u64 {
    15
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_content_type() -> String {
    "text/plain".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            topic_refresh_interval_secs: default_topic_refresh_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            content_type: default_content_type(),
            username: None,
            password: None,
        }
    }
}

/// Dispatch limits (`[dispatch]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Upper bound on invocations that have been dispatched but not yet
    /// resolved, across poll cycles.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// How long shutdown waits for in-flight invocations, in seconds.
    #[serde(default = "default_shutdown_drain_secs")]
    pub shutdown_drain_secs: u64,
}

fn default_max_in_flight() -> usize {
    100
}

fn default_shutdown_drain_secs() -> u64 {
    30
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            shutdown_drain_secs: default_shutdown_drain_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            queue: QueueConfig::default(),
            gateway: GatewayConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl Config {
    /// Read the TOML file at `path` (defaults when `None`) and apply
    /// environment overrides. Validation is left to the caller so CLI flags
    /// can still be layered on top.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml_str(&contents)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = get("SQS_CONNECTOR_QUEUE_URL") {
            self.queue.url = url;
        }
        // Region: SQS_CONNECTOR_REGION, then the SDK's own AWS_REGION
        if let Some(region) = get("SQS_CONNECTOR_REGION").or_else(|| get("AWS_REGION")) {
            self.queue.region = region;
        }
        if let Some(endpoint) = get("SQS_CONNECTOR_ENDPOINT_URL") {
            self.queue.endpoint_url = Some(endpoint);
        }
        if let Some(url) = get("SQS_CONNECTOR_GATEWAY_URL") {
            self.gateway.url = url;
        }
        if let Some(username) = get("SQS_CONNECTOR_GATEWAY_USERNAME") {
            self.gateway.username = Some(username);
        }
        if let Some(password) = get("SQS_CONNECTOR_GATEWAY_PASSWORD") {
            self.gateway.password = Some(password);
        }
        if let Some(level) = get("SQS_CONNECTOR_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        // Queue
        if self.queue.url.trim().is_empty() {
            anyhow::bail!("queue.url must be provided (--queue-url or SQS_CONNECTOR_QUEUE_URL)");
        }
        if self.queue.region.trim().is_empty() {
            anyhow::bail!("queue.region must be provided (--region or SQS_CONNECTOR_REGION)");
        }
        if !(1..=SQS_MAX_BATCH_SIZE).contains(&self.queue.max_number_of_messages) {
            anyhow::bail!(
                "queue.max_number_of_messages must be between 1 and {SQS_MAX_BATCH_SIZE}, got {}",
                self.queue.max_number_of_messages
            );
        }
        if !(0..=SQS_MAX_WAIT_TIME_SECS).contains(&self.queue.max_wait_time_secs) {
            anyhow::bail!(
                "queue.max_wait_time_secs must be between 0 and {SQS_MAX_WAIT_TIME_SECS}, got {}",
                self.queue.max_wait_time_secs
            );
        }
        if !(0..=SQS_MAX_VISIBILITY_TIMEOUT_SECS).contains(&self.queue.visibility_timeout_secs) {
            anyhow::bail!(
                "queue.visibility_timeout_secs must be between 0 and {SQS_MAX_VISIBILITY_TIMEOUT_SECS}, got {}",
                self.queue.visibility_timeout_secs
            );
        }

        // Gateway
        let gateway_url = self.gateway.url.trim();
        if !(gateway_url.starts_with("http://") || gateway_url.starts_with("https://")) {
            anyhow::bail!(
                "gateway.url must start with http:// or https://, got '{}'",
                self.gateway.url
            );
        }
        if self.gateway.topic_refresh_interval_secs == 0 {
            anyhow::bail!("gateway.topic_refresh_interval_secs must be greater than 0");
        }
        if self.gateway.request_timeout_secs == 0 {
            anyhow::bail!("gateway.request_timeout_secs must be greater than 0");
        }
        if self.gateway.connect_timeout_secs == 0 {
            anyhow::bail!("gateway.connect_timeout_secs must be greater than 0");
        }
        if self.gateway.password.is_some() && self.gateway.username.is_none() {
            anyhow::bail!("gateway.password is set but gateway.username is not");
        }

        // Dispatch
        if !(1..=MAX_IN_FLIGHT).contains(&self.dispatch.max_in_flight) {
            anyhow::bail!(
                "dispatch.max_in_flight must be between 1 and {MAX_IN_FLIGHT}, got {}",
                self.dispatch.max_in_flight
            );
        }

        tracing_subscriber::EnvFilter::try_new(&self.log_level)
            .with_context(|| format!("log_level '{}' is not a valid log filter", self.log_level))?;

        Ok(())
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.gateway.password.is_some() {
            config.gateway.password = Some(REDACTED.into());
        }
        config
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// JSON schema of the configuration file.
    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(Config);
        serde_json::to_string_pretty(&schema).context("Failed to serialize config schema")
    }
}
