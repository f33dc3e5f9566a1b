//! Applying planned actions against storage.
//!
//! A [`Transfer`] binds one rule to one source region and one destination
//! region and knows how to carry out every [`Action`] between them.

use crate::error::{EngineError, Result};
use std::sync::Arc;
use sync_client::{CopyRequest, Region, StorageError};
use sync_types::{Action, BucketRule, CopyStrategy};

type StorageResult<T> = std::result::Result<T, StorageError>;

/// Source and destination of one replication leg.
#[derive(Debug)]
pub struct Transfer {
    rule: Arc<BucketRule>,
    source: Arc<Region>,
    source_bucket: String,
    dest: Arc<Region>,
    dest_bucket: String,
}

impl Transfer {
    /// Bind `rule` to its source region and one destination region.
    pub fn new(rule: Arc<BucketRule>, source: Arc<Region>, dest: Arc<Region>) -> Self {
        let source_bucket = rule.source_bucket.clone();
        let dest_bucket = rule.dest_bucket_name(dest.suffix());
        Self {
            rule,
            source,
            source_bucket,
            dest,
            dest_bucket,
        }
    }

    /// Rule being replicated.
    pub fn rule(&self) -> &BucketRule {
        &self.rule
    }

    /// Source region.
    pub fn source(&self) -> &Region {
        &self.source
    }

    /// Destination region.
    pub fn dest(&self) -> &Region {
        &self.dest
    }

    /// Source bucket name.
    pub fn source_bucket(&self) -> &str {
        &self.source_bucket
    }

    /// Destination bucket name, with the region suffix applied.
    pub fn dest_bucket(&self) -> &str {
        &self.dest_bucket
    }

    /// Carry out one action.
    pub async fn apply(&self, action: &Action) -> Result<()> {
        match action {
            Action::Copy {
                key,
                size,
                strategy,
            } => self.copy(key, *size, *strategy).await,
            Action::Touch { key } => self.touch(key).await,
            Action::Delete { key } => self.delete(key).await,
        }
    }

    async fn copy(&self, key: &str, size: u64, strategy: CopyStrategy) -> Result<()> {
        let dest_key = self.rule.dest_name(key);
        tracing::debug!(
            "Copying [{}/{} --> {}/{}] ({}, {} bytes)",
            self.source_bucket,
            key,
            self.dest_bucket,
            dest_key,
            strategy,
            size
        );

        let result = match strategy {
            CopyStrategy::Express => {
                let request =
                    CopyRequest::new(&self.source_bucket, key, &self.dest_bucket, &dest_key);
                self.dest.store().copy_object(&request).await
            }
            CopyStrategy::Stream => self.stream(key, &dest_key, size).await,
        };

        result.map_err(|source| EngineError::Copy {
            source_bucket: self.source_bucket.clone(),
            key: key.to_string(),
            bucket: self.dest_bucket.clone(),
            dest_key,
            source,
        })
    }

    async fn stream(&self, key: &str, dest_key: &str, size: u64) -> StorageResult<()> {
        let body = self
            .source
            .store()
            .get_object(&self.source_bucket, key)
            .await?;
        self.dest
            .store()
            .upload(&self.dest_bucket, dest_key, body, size)
            .await
    }

    async fn touch(&self, key: &str) -> Result<()> {
        tracing::debug!("Touching [{}/{}]", self.dest_bucket, key);
        let request = CopyRequest::touch(&self.dest_bucket, key);
        self.dest
            .store()
            .copy_object(&request)
            .await
            .map_err(|source| EngineError::Touch {
                bucket: self.dest_bucket.clone(),
                key: key.to_string(),
                source,
            })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        tracing::debug!("Deleting [{}/{}]", self.dest_bucket, key);
        self.dest
            .store()
            .delete_object(&self.dest_bucket, key)
            .await
            .map_err(|source| EngineError::Delete {
                bucket: self.dest_bucket.clone(),
                key: key.to_string(),
                source,
            })
    }
}
