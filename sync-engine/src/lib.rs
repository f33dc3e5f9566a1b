//! # sync-engine
//!
//! Replication engine for bucket-sync.
//!
//! This crate drives the two replication paths:
//! - **Full sync**: list every rule's source and destinations, plan the
//!   difference, and execute it with bounded concurrency
//! - **Incremental**: apply single-object notifications from a queue
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   [[buckets]] ─►│   FullSync   │──► plan ──► executor ──┐
//!                 └──────────────┘                        │
//!                 ┌──────────────┐                        ▼
//!   queue ───────►│ QueueConsumer│──► EventProcessor ──► Transfer ──► ObjectStore
//!                 └──────────────┘                        ▲
//!                                     RegionRegistry ─────┘
//! ```
//!
//! ## Failure model
//!
//! Each rule, and each destination of a rule, succeeds or fails on its own.
//! Inside one phase the executor stops launching work after the first
//! failure but lets running actions finish. Nothing is retried here; retries
//! and timeouts belong to the storage client.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod full_sync;
pub mod job;
pub mod queue;
pub mod transfer;

pub use config::{
    AwsConfig, CleanupOrder, Config, ConfigError, LoggingConfig, QueueConfig, SyncConfig,
};
pub use error::{EngineError, Result};
pub use events::{EventOutcome, EventProcessor};
pub use executor::{execute, Execution};
pub use full_sync::{
    DestinationReport, FullSync, PhaseReport, RuleReport, SyncOptions, SyncReport,
};
pub use job::{BucketView, DestinationListing, SyncJob};
pub use queue::{
    BatchStats, MessageQueue, MockQueue, QueueConsumer, QueueError, QueueMessage, SqsQueue,
};
pub use transfer::Transfer;
