//! # sync-types
//!
//! Data model shared by every bucket-sync crate.
//!
//! - [`ObjectRecord`], [`Snapshot`] - Listing entries and the maps built from them
//! - [`BucketRule`], [`RegionConfig`], [`AccountId`] - Replication topology
//! - [`Action`], [`CopyStrategy`] - The action vocabulary shared by full sync and events
//! - [`Notification`] - Storage-change notification envelope (JSON wire format)
//! - [`EventError`] - Errors raised while decoding notifications

#![warn(missing_docs)]
#![warn(clippy::all)]

mod action;
mod error;
mod event;
mod ids;
mod object;
mod rule;

pub use action::{Action, ActionKind, CopyStrategy};
pub use error::EventError;
pub use event::{
    BucketEntity, EventKind, EventRecord, Notification, ObjectEntity, S3Entity, TEST_EVENT,
};
pub use ids::{AccountId, Fingerprint};
pub use object::{ObjectMap, ObjectRecord, Snapshot};
pub use rule::{BucketRule, RegionConfig};
