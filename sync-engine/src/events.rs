//! Notification-driven replication of single objects.
//!
//! The [`EventProcessor`] decodes a queue message with
//! [`sync_core::decide`] and fans the resulting copy or delete out to every
//! destination region of the matched rule.

use crate::error::Result;
use crate::executor::execute;
use crate::transfer::Transfer;
use std::sync::Arc;
use sync_client::RegionRegistry;
use sync_core::{choose_strategy, decide, EventDecision, Ignored};
use sync_types::{Action, BucketRule};

/// What handling a notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Nothing to do.
    Ignored(Ignored),
    /// The object was copied to every destination region.
    Replicated {
        /// Source key.
        key: String,
        /// Destination regions written.
        regions: usize,
    },
    /// The destination key was deleted in every destination region.
    Removed {
        /// Destination key.
        key: String,
        /// Destination regions written.
        regions: usize,
    },
}

/// Applies single-object notifications.
#[derive(Debug)]
pub struct EventProcessor {
    registry: Arc<RegionRegistry>,
    rules: Vec<BucketRule>,
}

impl EventProcessor {
    /// Create a processor over `rules`.
    pub fn new(registry: Arc<RegionRegistry>, rules: Vec<BucketRule>) -> Self {
        Self { registry, rules }
    }

    /// Handle one queue message body.
    ///
    /// Returns `Ok` when the message may be acknowledged. Every destination
    /// region is written concurrently; any region failing fails the message.
    ///
    /// # Errors
    ///
    /// Decoding errors ([`EngineError::Event`](crate::EngineError::Event)),
    /// unknown regions and the first storage failure across regions.
    pub async fn handle(&self, body: &str) -> Result<EventOutcome> {
        match decide(&self.rules, body)? {
            EventDecision::Ignore(reason) => {
                match &reason {
                    Ignored::TestEvent => tracing::info!("Received test event"),
                    Ignored::NoMatchingRule { bucket, key } => {
                        tracing::debug!("No rule matches {}/{}, ignoring", bucket, key)
                    }
                }
                Ok(EventOutcome::Ignored(reason))
            }
            EventDecision::Replicate { rule, key, size } => {
                tracing::info!("Replicating {}/{} ({} bytes)", rule.source_bucket, key, size);
                let regions = self
                    .fan_out(rule, |transfer| Action::Copy {
                        key: key.clone(),
                        size,
                        strategy: choose_strategy(
                            transfer.source().account(),
                            transfer.dest().account(),
                            size,
                        ),
                    })
                    .await?;
                Ok(EventOutcome::Replicated { key, regions })
            }
            EventDecision::Remove { rule, key } => {
                let dest_key = rule.dest_name(&key);
                tracing::info!(
                    "Removing {} (from {}/{})",
                    dest_key,
                    rule.source_bucket,
                    key
                );
                let regions = self
                    .fan_out(rule, |_| Action::Delete {
                        key: dest_key.clone(),
                    })
                    .await?;
                Ok(EventOutcome::Removed {
                    key: dest_key,
                    regions,
                })
            }
        }
    }

    /// Apply one action per destination region of `rule`, all at once.
    async fn fan_out(
        &self,
        rule: &BucketRule,
        action_for: impl Fn(&Transfer) -> Action,
    ) -> Result<usize> {
        let rule = Arc::new(rule.clone());
        let source = self.registry.resolve(&rule.source_region)?;
        let legs = rule
            .dest_regions
            .iter()
            .map(|region_id| {
                let transfer = Transfer::new(
                    Arc::clone(&rule),
                    Arc::clone(&source),
                    self.registry.resolve(region_id)?,
                );
                let action = action_for(&transfer);
                Ok((Arc::new(transfer), action))
            })
            .collect::<Result<Vec<_>>>()?;

        let limit = legs.len();
        execute(legs, limit, |(transfer, action)| async move {
            transfer.apply(&action).await
        })
        .await
        .into_result()
    }
}
