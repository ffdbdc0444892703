#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::items_after_statements,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self
)]

//! Consume messages from an AWS SQS queue, invoke the gateway functions
//! subscribed to each message's topic, and acknowledge the message only once
//! the invocation succeeded.

use clap::{Args, Subcommand};

pub mod config;
pub mod daemon;
pub mod error;
pub mod invoker;
pub mod processors;
pub mod queue;
pub mod util;

pub use config::Config;
pub use error::ConnectorError;

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Print the resolved configuration as TOML (secrets redacted)
    Show,
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

/// Flag overrides for `run`; each one wins over the config file and the
/// environment.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// URL of the SQS queue to pop messages from
    #[arg(long)]
    pub queue_url: Option<String>,

    /// AWS region of the queue
    #[arg(long)]
    pub region: Option<String>,

    /// Custom SQS endpoint (e.g. a local emulator)
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Maximum number of messages per receive call (1-10)
    #[arg(long)]
    pub max_number_of_messages: Option<i32>,

    /// Long-poll wait per receive call, in seconds (0-20)
    #[arg(long)]
    pub max_wait_time: Option<i32>,

    /// How long received messages stay hidden from other consumers, in seconds
    #[arg(long)]
    pub visibility_timeout: Option<i32>,

    /// Base URL of the function gateway
    #[arg(long, alias = "openfaas-gateway-url")]
    pub gateway_url: Option<String>,

    /// Interval between topic map refreshes, in seconds
    #[arg(long)]
    pub topic_refresh_interval: Option<u64>,

    /// Maximum number of dispatched but unresolved messages
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    pub log_level: Option<String>,
}

impl RunArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.queue_url {
            config.queue.url = url.clone();
        }
        if let Some(region) = &self.region {
            config.queue.region = region.clone();
        }
        if let Some(endpoint) = &self.endpoint_url {
            config.queue.endpoint_url = Some(endpoint.clone());
        }
        if let Some(max) = self.max_number_of_messages {
            config.queue.max_number_of_messages = max;
        }
        if let Some(wait) = self.max_wait_time {
            config.queue.max_wait_time_secs = wait;
        }
        if let Some(timeout) = self.visibility_timeout {
            config.queue.visibility_timeout_secs = timeout;
        }
        if let Some(url) = &self.gateway_url {
            config.gateway.url = url.clone();
        }
        if let Some(interval) = self.topic_refresh_interval {
            config.gateway.topic_refresh_interval_secs = interval;
        }
        if let Some(max) = self.max_in_flight {
            config.dispatch.max_in_flight = max;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}
