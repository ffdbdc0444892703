use crate::config::Config;
use crate::invoker::{build_gateway_client, BasicAuth, GatewayInvoker, TopicMap};
use crate::processors::{MessageProcessor, ResponseProcessor};
use crate::queue::{QueueClient, SqsQueueClient};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Run the connector against SQS until SIGINT/SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let queue: Arc<dyn QueueClient> = Arc::new(SqsQueueClient::from_config(&config.queue).await);
    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());
    run_pipeline(&config, queue, shutdown).await
}

/// Wire the pipeline around `queue` and run it until `shutdown` is
/// cancelled or an outcome can no longer be correlated.
///
/// On shutdown the poll loop finishes its current cycle, then in-flight
/// invocations and their queue mutations get up to
/// `dispatch.shutdown_drain_secs` to complete. Messages still unresolved
/// after that reappear once their visibility timeout expires.
pub async fn run_pipeline(
    config: &Config,
    queue: Arc<dyn QueueClient>,
    shutdown: CancellationToken,
) -> Result<()> {
    let tasks = TaskTracker::new();
    let fatal = CancellationToken::new();
    // Cancelled with `shutdown`, or explicitly on a fatal error.
    let stop = shutdown.child_token();

    let responses = Arc::new(ResponseProcessor::new(
        Arc::clone(&queue),
        config.queue.url.clone(),
        tasks.clone(),
        fatal.clone(),
    ));

    let client = build_gateway_client(&config.gateway);
    let auth = BasicAuth::from_config(&config.gateway);
    let topics = Arc::new(TopicMap::new());
    let refresh_interval = Duration::from_secs(config.gateway.topic_refresh_interval_secs);
    // No receive before the first function listing.
    if !topics
        .load_initial(
            &client,
            &config.gateway.url,
            auth.as_ref(),
            refresh_interval,
            &shutdown,
        )
        .await
    {
        tracing::info!("Connector stopped before the topic map was loaded");
        return Ok(());
    }
    tracing::info!(topics = topics.topic_count(), "Topic map loaded");

    let invoker = Arc::new(GatewayInvoker::new(
        &config.gateway,
        client.clone(),
        Arc::clone(&topics),
        responses,
        tasks.clone(),
    ));
    let processor = MessageProcessor::new(
        queue,
        invoker,
        &config.queue,
        Arc::new(Semaphore::new(config.dispatch.max_in_flight)),
    );

    let refresher = {
        let topics = Arc::clone(&topics);
        let gateway_url = config.gateway.url.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            topics
                .run_refresher(client, gateway_url, auth, refresh_interval, stop)
                .await;
        })
    };
    let poller = {
        let stop = stop.clone();
        tokio::spawn(async move { processor.run(stop).await })
    };

    tracing::info!(
        queue_url = %config.queue.url,
        gateway_url = %config.gateway.url,
        max_in_flight = config.dispatch.max_in_flight,
        "Connector started"
    );

    let fatal_stop = tokio::select! {
        () = shutdown.cancelled() => false,
        () = fatal.cancelled() => true,
    };
    stop.cancel();

    if let Err(e) = poller.await {
        tracing::error!("Message processor task failed: {e}");
    }
    if let Err(e) = refresher.await {
        tracing::error!("Topic refresher task failed: {e}");
    }

    tasks.close();
    let drain = Duration::from_secs(config.dispatch.shutdown_drain_secs);
    if tokio::time::timeout(drain, tasks.wait()).await.is_err() {
        tracing::warn!(
            pending = tasks.len(),
            "Shutdown drain timed out; unresolved messages will reappear after their visibility timeout"
        );
    }

    if fatal_stop {
        anyhow::bail!("Connector stopped: an invocation outcome lost its correlation context");
    }
    tracing::info!("Connector stopped");
    Ok(())
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => tracing::info!("SIGTERM received, shutting down"),
                        _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT received, shutting down"),
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to register SIGTERM handler: {e}");
                    wait_for_ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        wait_for_ctrl_c().await;

        shutdown.cancel();
    });
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
        Err(e) => tracing::error!("Failed to listen for Ctrl-C, shutting down: {e}"),
    }
}
