//! Follow bucket notifications.

use anyhow::Result;
use std::sync::Arc;
use sync_engine::{Config, EventProcessor, QueueConsumer, SqsQueue};

use super::connect;

/// Run the watch command until Ctrl-C.
pub async fn run(config: &Config) -> Result<()> {
    let queue_config = config.queue()?;
    let (sdk, registry) = connect(config).await;

    let processor = EventProcessor::new(registry, config.buckets.clone());
    let queue = SqsQueue::from_sdk_config(&sdk, queue_config);
    tracing::info!("Watching {} ({} rules)", queue_config.url, config.buckets.len());

    QueueConsumer::new(Arc::new(queue), Arc::new(processor))
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Cannot listen for Ctrl-C, stopping: {}", e);
            }
        })
        .await;
    Ok(())
}
