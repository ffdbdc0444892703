//! Topic → function-name map rebuilt from the gateway's function list.

use super::gateway::BasicAuth;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Annotation whose comma-separated value lists the topics a function serves.
const TOPIC_ANNOTATION: &str = "topic";

#[derive(Debug, Deserialize)]
struct FunctionStatus {
    name: String,
    #[serde(default)]
    annotations: Option<HashMap<String, String>>,
}

#[derive(Debug, Default)]
pub struct TopicMap {
    inner: RwLock<HashMap<String, Vec<String>>>,
}

impl TopicMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Functions registered for `topic`, in gateway order.
    pub fn functions_for(&self, topic: &str) -> Vec<String> {
        self.inner.read().get(topic).cloned().unwrap_or_default()
    }

    pub fn topic_count(&self) -> usize {
        self.inner.read().len()
    }

    pub fn replace(&self, map: HashMap<String, Vec<String>>) {
        *self.inner.write() = map;
    }

    /// Fetch `{gateway}/system/functions` and swap in the rebuilt map.
    pub async fn refresh(
        &self,
        client: &reqwest::Client,
        gateway_url: &str,
        auth: Option<&BasicAuth>,
    ) -> Result<()> {
        let url = format!("{}/system/functions", gateway_url.trim_end_matches('/'));
        let functions: Vec<FunctionStatus> = BasicAuth::apply(auth, client.get(&url))
            .send()
            .await
            .with_context(|| format!("Failed to list functions at {url}"))?
            .error_for_status()
            .with_context(|| format!("Gateway rejected function listing at {url}"))?
            .json()
            .await
            .context("Failed to parse function listing")?;

        let map = build_topic_map(functions);
        tracing::debug!(topics = map.len(), "Topic map rebuilt");
        self.replace(map);
        Ok(())
    }

    /// Retry the first refresh every `interval` until it succeeds. Returns
    /// `false` if `shutdown` fires before the map could be loaded.
    pub async fn load_initial(
        &self,
        client: &reqwest::Client,
        gateway_url: &str,
        auth: Option<&BasicAuth>,
        interval: Duration,
        shutdown: &CancellationToken,
    ) -> bool {
        loop {
            let refreshed = tokio::select! {
                biased;
                () = shutdown.cancelled() => return false,
                refreshed = self.refresh(client, gateway_url, auth) => refreshed,
            };
            match refreshed {
                Ok(()) => return true,
                Err(e) => tracing::warn!(
                    retry_secs = interval.as_secs(),
                    "Topic map unavailable, not polling yet: {e:#}"
                ),
            }

            tokio::select! {
                biased;
                () = shutdown.cancelled() => return false,
                () = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Rebuild the map every `interval` until `shutdown` fires. A failed
    /// refresh keeps the previous map.
    pub async fn run_refresher(
        &self,
        client: reqwest::Client,
        gateway_url: String,
        auth: Option<BasicAuth>,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; the daemon already did the initial refresh.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.refresh(&client, &gateway_url, auth.as_ref()).await {
                tracing::warn!("Topic map refresh failed, keeping previous map: {e:#}");
            }
        }
    }
}

fn build_topic_map(functions: Vec<FunctionStatus>) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for function in functions {
        let Some(topics) = function
            .annotations
            .as_ref()
            .and_then(|a| a.get(TOPIC_ANNOTATION))
        else {
            continue;
        };

        for topic in topics.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let names = map.entry(topic.to_string()).or_default();
            if !names.contains(&function.name) {
                names.push(function.name.clone());
            }
        }
    }
    map
}
