//! Notification queue consumption.
//!
//! [`QueueConsumer`] long-polls a [`MessageQueue`], hands each message to the
//! [`EventProcessor`] in order, and deletes a message only after it was
//! processed successfully. Anything else stays on the queue for redelivery.

use crate::config::QueueConfig;
use crate::events::{EventOutcome, EventProcessor};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Pause after a failed receive before polling again.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Receiving messages failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// Deleting a processed message failed.
    #[error("acknowledge failed for message {id}: {message}")]
    Acknowledge {
        /// Message id.
        id: String,
        /// Error details.
        message: String,
    },
}

/// One received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Message id, for logs.
    pub id: String,
    /// Raw body.
    pub body: String,
    /// Handle needed to delete the message.
    pub receipt_handle: String,
}

/// A queue of notification messages.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Wait for the next batch of messages. May return an empty batch.
    async fn receive(&self) -> Result<Vec<QueueMessage>, QueueError>;

    /// Delete a processed message.
    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), QueueError>;
}

/// [`MessageQueue`] backed by Amazon SQS.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    url: String,
    batch_size: i32,
    wait_time_secs: i32,
}

impl SqsQueue {
    /// Wrap an SQS client.
    pub fn new(client: Client, config: &QueueConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            batch_size: config.batch_size,
            wait_time_secs: config.wait_time_secs,
        }
    }

    /// Build a client for the queue's region from the shared SDK configuration.
    pub fn from_sdk_config(base: &SdkConfig, config: &QueueConfig) -> Self {
        let sqs_config = aws_sdk_sqs::config::Builder::from(base)
            .region(Region::new(config.region.clone()))
            .build();
        Self::new(Client::from_conf(sqs_config), config)
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.url)
            .max_number_of_messages(self.batch_size)
            .wait_time_seconds(self.wait_time_secs)
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(e).to_string()))?;

        let mut messages = Vec::new();
        for message in output.messages() {
            let id = message.message_id().unwrap_or("<no id>").to_string();
            match (message.body(), message.receipt_handle()) {
                (Some(body), Some(receipt_handle)) => messages.push(QueueMessage {
                    id,
                    body: body.to_string(),
                    receipt_handle: receipt_handle.to_string(),
                }),
                _ => tracing::warn!("Skipping message {} without body or receipt handle", id),
            }
        }
        Ok(messages)
    }

    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.url)
            .receipt_handle(&message.receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Acknowledge {
                id: message.id.clone(),
                message: DisplayErrorContext(e).to_string(),
            })?;
        Ok(())
    }
}

/// In-memory [`MessageQueue`] for testing.
///
/// Unacknowledged messages are not redelivered; tests inspect
/// [`MockQueue::acknowledged`] instead.
#[derive(Debug, Clone, Default)]
pub struct MockQueue {
    inner: Arc<Mutex<MockQueueInner>>,
}

#[derive(Debug, Default)]
struct MockQueueInner {
    batches: VecDeque<Result<Vec<QueueMessage>, String>>,
    acknowledged: Vec<String>,
}

impl MockQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch of `(id, body)` messages for the next receive.
    pub fn push_batch<'a>(&self, messages: impl IntoIterator<Item = (&'a str, &'a str)>) {
        let batch = messages
            .into_iter()
            .map(|(id, body)| QueueMessage {
                id: id.to_string(),
                body: body.to_string(),
                receipt_handle: format!("receipt-{}", id),
            })
            .collect();
        self.inner.lock().unwrap().batches.push_back(Ok(batch));
    }

    /// Make the next receive fail.
    pub fn push_receive_error(&self, message: &str) {
        self.inner
            .lock()
            .unwrap()
            .batches
            .push_back(Err(message.to_string()));
    }

    /// Ids of acknowledged messages, in order.
    pub fn acknowledged(&self) -> Vec<String> {
        self.inner.lock().unwrap().acknowledged.clone()
    }

    /// Number of batches not yet received.
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().batches.len()
    }
}

#[async_trait]
impl MessageQueue for MockQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>, QueueError> {
        let next = self.inner.lock().unwrap().batches.pop_front();
        match next {
            Some(Ok(batch)) => Ok(batch),
            Some(Err(message)) => Err(QueueError::Receive(message)),
            None => {
                // Behave like an empty long poll.
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), QueueError> {
        self.inner
            .lock()
            .unwrap()
            .acknowledged
            .push(message.id.clone());
        Ok(())
    }
}

/// Counters for one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Messages received.
    pub received: usize,
    /// Messages processed and deleted.
    pub acknowledged: usize,
    /// Messages left on the queue.
    pub failed: usize,
}

/// Feeds queue messages to an [`EventProcessor`].
pub struct QueueConsumer {
    queue: Arc<dyn MessageQueue>,
    processor: Arc<EventProcessor>,
    retry_delay: Duration,
}

impl QueueConsumer {
    /// Create a consumer.
    pub fn new(queue: Arc<dyn MessageQueue>, processor: Arc<EventProcessor>) -> Self {
        Self {
            queue,
            processor,
            retry_delay: RECEIVE_RETRY_DELAY,
        }
    }

    /// Override the pause after a failed receive.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Receive and process one batch.
    pub async fn poll_once(&self) -> Result<BatchStats, QueueError> {
        let batch = self.queue.receive().await?;
        Ok(self.process_batch(batch).await)
    }

    /// Process messages until `shutdown` resolves.
    ///
    /// Shutdown is checked while waiting for messages; a batch already
    /// received is always processed to the end.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        tracing::info!("Queue consumer started");

        loop {
            let received = tokio::select! {
                _ = &mut shutdown => break,
                received = self.queue.receive() => received,
            };

            match received {
                Ok(batch) => {
                    self.process_batch(batch).await;
                }
                Err(e) => {
                    tracing::error!("Queue receive error: {}", e);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }

        tracing::info!("Queue consumer stopped");
    }

    async fn process_batch(&self, batch: Vec<QueueMessage>) -> BatchStats {
        let mut stats = BatchStats {
            received: batch.len(),
            ..BatchStats::default()
        };
        if !batch.is_empty() {
            tracing::debug!("Received {} messages", batch.len());
        }

        for message in batch {
            match self.processor.handle(&message.body).await {
                Ok(outcome) => {
                    log_outcome(&message, &outcome);
                    match self.queue.acknowledge(&message).await {
                        Ok(()) => stats.acknowledged += 1,
                        Err(e) => {
                            tracing::warn!("{}", e);
                            stats.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Message {} failed, leaving it queued: {}", message.id, e);
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}

fn log_outcome(message: &QueueMessage, outcome: &EventOutcome) {
    match outcome {
        EventOutcome::Ignored(reason) => {
            tracing::debug!("Message {} ignored: {:?}", message.id, reason)
        }
        EventOutcome::Replicated { key, regions } => {
            tracing::info!("Message {}: replicated {} to {} regions", message.id, key, regions)
        }
        EventOutcome::Removed { key, regions } => {
            tracing::info!("Message {}: removed {} from {} regions", message.id, key, regions)
        }
    }
}
