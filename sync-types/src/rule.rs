//! Replication topology: regions and bucket rules.

use serde::Deserialize;
use std::fmt;

use crate::AccountId;

/// One entry of the region table.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct RegionConfig {
    /// Region identifier (e.g. `us-west-2`).
    pub id: String,
    /// Suffix appended to a destination bucket base name in this region.
    pub suffix: String,
    /// Override access key; regions without one use the base credentials.
    #[serde(default)]
    pub access_key: Option<String>,
    /// Override secret key, paired with `access_key`.
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl RegionConfig {
    /// Create a region that uses the base credentials.
    pub fn new(id: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            suffix: suffix.into(),
            access_key: None,
            secret_key: None,
        }
    }

    /// Attach override credentials.
    pub fn with_credentials(mut self, access_key: &str, secret_key: &str) -> Self {
        self.access_key = Some(access_key.to_string());
        self.secret_key = Some(secret_key.to_string());
        self
    }

    /// Logical account this region authenticates as.
    pub fn account(&self) -> AccountId {
        AccountId::from_override(self.access_key.as_deref())
    }

    /// Override credentials as `(access_key, secret_key)`, if both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.access_key.as_deref(), self.secret_key.as_deref()) {
            (Some(access), Some(secret)) if !access.is_empty() => Some((access, secret)),
            _ => None,
        }
    }

    /// Check whether exactly one of `access_key` and `secret_key` is set.
    ///
    /// Such a region would be keyed as its own account while its client
    /// authenticates with the base credentials.
    pub fn has_partial_credentials(&self) -> bool {
        is_set(self.access_key.as_deref()) != is_set(self.secret_key.as_deref())
    }
}

fn is_set(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

impl fmt::Debug for RegionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionConfig")
            .field("id", &self.id)
            .field("suffix", &self.suffix)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One source bucket/prefix and the destinations it fans out to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BucketRule {
    /// Source bucket name.
    pub source_bucket: String,
    /// Key prefix replicated from the source bucket.
    #[serde(default)]
    pub source_prefix: String,
    /// Region the source bucket lives in.
    pub source_region: String,
    /// Destination bucket base name; each region appends its suffix.
    pub dest_bucket: String,
    /// Prefix substituted for `source_prefix` in destination keys.
    #[serde(default)]
    pub dest_prefix: String,
    /// Destination regions, in configuration order.
    pub dest_regions: Vec<String>,
}

impl BucketRule {
    /// Map a source key to its destination key.
    ///
    /// The first occurrence of the source prefix is replaced by the destination
    /// prefix. Listed keys always start with the source prefix, so in practice
    /// this swaps the leading prefix.
    pub fn dest_name(&self, source_key: &str) -> String {
        match source_key.strip_prefix(&self.source_prefix) {
            Some(rest) => format!("{}{}", self.dest_prefix, rest),
            None => source_key.replacen(&self.source_prefix, &self.dest_prefix, 1),
        }
    }

    /// Concrete destination bucket name for a region suffix.
    pub fn dest_bucket_name(&self, region_suffix: &str) -> String {
        format!("{}{}", self.dest_bucket, region_suffix)
    }

    /// Check whether an object in `bucket` at `key` is covered by this rule.
    pub fn matches(&self, bucket: &str, key: &str) -> bool {
        self.source_bucket == bucket && key.starts_with(&self.source_prefix)
    }

    /// Short `bucket/prefix` label for logs.
    pub fn label(&self) -> String {
        format!("{}/{}", self.source_bucket, self.source_prefix)
    }
}
