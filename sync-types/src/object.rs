//! Object listing records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{AccountId, Fingerprint};

/// Metadata for one object as reported by a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Full object key (listing prefix included).
    pub key: String,
    /// Last-modified timestamp reported by the storage API.
    pub last_modified: DateTime<Utc>,
    /// Content fingerprint (ETag).
    pub fingerprint: Fingerprint,
    /// Size in bytes.
    pub size: u64,
}

impl ObjectRecord {
    /// Create a new record.
    pub fn new(
        key: impl Into<String>,
        last_modified: DateTime<Utc>,
        fingerprint: impl Into<Fingerprint>,
        size: u64,
    ) -> Self {
        Self {
            key: key.into(),
            last_modified,
            fingerprint: fingerprint.into(),
            size,
        }
    }
}

/// Key → record map produced by a complete listing.
pub type ObjectMap = HashMap<String, ObjectRecord>;

/// A listing paired with the account it was read under.
///
/// This is all the planner needs to know about one side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Account of the region the bucket lives in.
    pub account: AccountId,
    /// Complete listing of the bucket prefix.
    pub objects: ObjectMap,
}

impl Snapshot {
    /// Create a snapshot from a listing.
    pub fn new(account: AccountId, objects: ObjectMap) -> Self {
        Self { account, objects }
    }

    /// Create an empty snapshot for the given account.
    pub fn empty(account: AccountId) -> Self {
        Self::new(account, ObjectMap::new())
    }

    /// Build a snapshot from an iterator of records.
    pub fn from_records(account: AccountId, records: impl IntoIterator<Item = ObjectRecord>) -> Self {
        let objects = records
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();
        Self::new(account, objects)
    }

    /// Number of objects in the listing.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the listing is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Look up a record by key.
    pub fn get(&self, key: &str) -> Option<&ObjectRecord> {
        self.objects.get(key)
    }
}
