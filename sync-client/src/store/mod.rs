//! Storage abstraction for bucket-sync.
//!
//! This module provides the capability interface the engine uses to reach
//! object storage, with an S3 implementation and an in-memory mock.
//!
//! # Design
//!
//! The trait mirrors the five storage operations replication needs:
//! - `list_page()` one page of a prefix listing
//! - `copy_object()` server-side copy (also used for in-place touches)
//! - `get_object()` the object body as a byte stream
//! - `upload()` a streamed upload with an expected length
//! - `delete_object()` removal
//!
//! Every write applies the store's [`WritePolicy`]. Retries and timeouts are
//! the implementation's business; the engine never retries.

mod mock;
mod s3;

pub use mock::{MockStore, MockStoreFactory, StoreCall};
pub use s3::{base_config, S3Store, S3StoreFactory};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use sync_types::ObjectRecord;
use thiserror::Error;

/// An object body: a fallible stream of byte chunks.
pub type ObjectStream = BoxStream<'static, Result<Bytes, StorageError>>;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage API rejected or failed a request.
    #[error("{operation} failed: {message}")]
    Api {
        /// API operation name.
        operation: &'static str,
        /// Error details from the client.
        message: String,
    },

    /// Reading an object body failed mid-stream.
    #[error("body stream failed: {0}")]
    Stream(String),

    /// A streamed body did not match its expected length.
    #[error("content length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Length announced for the upload.
        expected: u64,
        /// Bytes actually streamed.
        actual: u64,
    },

    /// The API answered with something we cannot use.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Object does not exist.
    #[error("no such object: {bucket}/{key}")]
    NotFound {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Entries on this page, in key order.
    pub objects: Vec<ObjectRecord>,
    /// More entries follow after the last key of this page.
    pub truncated: bool,
}

/// Whether a server-side copy keeps or replaces the object's user metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataDirective {
    /// Keep the source object's metadata.
    Copy,
    /// Rewrite metadata; required when copying an object onto itself.
    Replace,
}

/// A server-side copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Bucket to copy from.
    pub source_bucket: String,
    /// Key to copy from.
    pub source_key: String,
    /// Bucket to copy to.
    pub bucket: String,
    /// Key to copy to.
    pub key: String,
    /// Metadata handling.
    pub directive: MetadataDirective,
}

impl CopyRequest {
    /// Copy `source_bucket/source_key` to `bucket/key`, keeping metadata.
    pub fn new(
        source_bucket: impl Into<String>,
        source_key: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            source_bucket: source_bucket.into(),
            source_key: source_key.into(),
            bucket: bucket.into(),
            key: key.into(),
            directive: MetadataDirective::Copy,
        }
    }

    /// Copy an object onto itself to rewrite its metadata and storage policy.
    pub fn touch(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let key = key.into();
        Self {
            source_bucket: bucket.clone(),
            source_key: key.clone(),
            bucket,
            key,
            directive: MetadataDirective::Replace,
        }
    }

    /// Check whether source and destination are the same object.
    pub fn is_self_copy(&self) -> bool {
        self.source_bucket == self.bucket && self.source_key == self.key
    }
}

/// Encryption and storage class applied to every object written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePolicy {
    /// Server-side encryption algorithm (e.g. `AES256`).
    pub server_side_encryption: String,
    /// Storage class (e.g. `REDUCED_REDUNDANCY`).
    pub storage_class: String,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            server_side_encryption: "AES256".to_string(),
            storage_class: "REDUCED_REDUNDANCY".to_string(),
        }
    }
}

/// Object storage operations used by replication.
///
/// Implementations are shared read-only across every concurrent action of a
/// run, so they must be cheap to call from many tasks at once.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of `bucket` under `prefix`, starting after `marker`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
    ) -> Result<ListPage, StorageError>;

    /// Server-side copy with the write policy applied.
    async fn copy_object(&self, request: &CopyRequest) -> Result<(), StorageError>;

    /// Open an object's body as a stream.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, StorageError>;

    /// Upload a streamed body of exactly `content_length` bytes.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectStream,
        content_length: u64,
    ) -> Result<(), StorageError>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_is_a_replacing_self_copy() {
        let request = CopyRequest::touch("dest.euw1", "folder/a");
        assert!(request.is_self_copy());
        assert_eq!(request.directive, MetadataDirective::Replace);
    }

    #[test]
    fn copy_keeps_metadata() {
        let request = CopyRequest::new("src", "in/a", "dest", "out/a");
        assert!(!request.is_self_copy());
        assert_eq!(request.directive, MetadataDirective::Copy);
    }

    #[test]
    fn default_policy_is_encrypted_reduced_redundancy() {
        let policy = WritePolicy::default();
        assert_eq!(policy.server_side_encryption, "AES256");
        assert_eq!(policy.storage_class, "REDUCED_REDUNDANCY");
    }

    #[test]
    fn storage_error_display() {
        let err = StorageError::LengthMismatch {
            expected: 10,
            actual: 7,
        };
        assert_eq!(
            err.to_string(),
            "content length mismatch: expected 10 bytes, got 7"
        );
    }
}
