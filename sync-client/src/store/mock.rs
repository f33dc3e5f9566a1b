//! In-memory object store for testing.
//!
//! One [`MockStore`] is a whole storage "world": clones share the same
//! buckets, so handing clones to several regions lets server-side copies read
//! buckets that live in other regions, as they can in S3. Every call is
//! recorded, failures can be injected per key or per bucket listing, and an
//! artificial latency plus an in-flight gauge let tests observe concurrency.

use super::{CopyRequest, ListPage, ObjectStore, ObjectStream, StorageError};
use crate::registry::StoreFactory;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, TryStreamExt};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_types::{Fingerprint, ObjectRecord, RegionConfig};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// A storage call captured by [`MockStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `list_page`
    List {
        /// Bucket listed.
        bucket: String,
        /// Prefix listed.
        prefix: String,
        /// Continuation marker.
        marker: Option<String>,
    },
    /// `copy_object`
    Copy(CopyRequest),
    /// `get_object`
    Get {
        /// Bucket read.
        bucket: String,
        /// Key read.
        key: String,
    },
    /// `upload`
    Upload {
        /// Bucket written.
        bucket: String,
        /// Key written.
        key: String,
        /// Announced length.
        content_length: u64,
    },
    /// `delete_object`
    Delete {
        /// Bucket written.
        bucket: String,
        /// Key deleted.
        key: String,
    },
}

#[derive(Debug, Clone)]
struct MockObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
    fingerprint: Fingerprint,
}

#[derive(Debug, Default)]
struct MockStoreInner {
    buckets: HashMap<String, BTreeMap<String, MockObject>>,
    calls: Vec<StoreCall>,
    failing_keys: HashSet<String>,
    failing_listings: HashSet<String>,
    page_size: Option<usize>,
    latency: Duration,
    active: HashMap<&'static str, usize>,
    peaks: HashMap<&'static str, usize>,
}

/// In-memory object store.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    inner: Arc<Mutex<MockStoreInner>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight gauges when the call finishes.
struct InFlight {
    store: MockStore,
    operation: &'static str,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.store.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Ok(mut inner) = self.store.inner.lock() {
            if let Some(active) = inner.active.get_mut(self.operation) {
                *active -= 1;
            }
        }
    }
}

impl MockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit listing pages to `page_size` entries to exercise pagination.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.inner.lock().unwrap().page_size = Some(page_size.max(1));
        self
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().unwrap().latency = latency;
    }

    /// Seed an object with an explicit timestamp.
    pub fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
    ) {
        let data = data.into();
        let fingerprint = fingerprint_of(&data);
        self.insert(bucket, key, data, last_modified, fingerprint);
    }

    /// Seed an object with an explicit fingerprint.
    pub fn put_object_with_fingerprint(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
        fingerprint: &str,
    ) {
        self.insert(
            bucket,
            key,
            data.into(),
            last_modified,
            Fingerprint::new(fingerprint),
        );
    }

    /// Get an object's body.
    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let inner = self.inner.lock().unwrap();
        inner
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.data.clone())
    }

    /// Get an object's listing record.
    pub fn record(&self, bucket: &str, key: &str) -> Option<ObjectRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| to_record(key, object))
    }

    /// All keys in a bucket, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    /// Make every operation touching `key` fail.
    pub fn fail_key(&self, key: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing_keys
            .insert(key.to_string());
    }

    /// Make listings of `bucket` fail.
    pub fn fail_listing(&self, bucket: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing_listings
            .insert(bucket.to_string());
    }

    /// Highest number of calls that were ever in progress at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of `operation` calls (`"CopyObject"`, `"DeleteObject"`,
    /// `"PutObject"`, ...) that were ever in progress at once.
    pub fn peak_in_flight_for(&self, operation: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.peaks.get(operation).copied().unwrap_or(0)
    }

    fn insert(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        last_modified: DateTime<Utc>,
        fingerprint: Fingerprint,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            MockObject {
                data,
                last_modified,
                fingerprint,
            },
        );
    }

    /// Record the call, wait out the latency and check for injected failures.
    async fn enter(
        &self,
        call: StoreCall,
        operation: &'static str,
        key: &str,
    ) -> Result<InFlight, StorageError> {
        let (latency, failing) = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(call);
            let active = inner.active.entry(operation).or_default();
            *active += 1;
            let now = *active;
            let peak = inner.peaks.entry(operation).or_default();
            *peak = (*peak).max(now);
            (inner.latency, inner.failing_keys.contains(key))
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight {
            store: self.clone(),
            operation,
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if failing {
            return Err(injected(operation));
        }
        Ok(guard)
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        let call = StoreCall::List {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            marker: marker.map(str::to_string),
        };
        let _guard = self.enter(call, "ListObjects", "").await?;

        let inner = self.inner.lock().unwrap();
        if inner.failing_listings.contains(bucket) {
            return Err(injected("ListObjects"));
        }
        let page_size = inner.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let mut objects: Vec<ObjectRecord> = inner
            .buckets
            .get(bucket)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(key, _)| key.starts_with(prefix))
                    .filter(|(key, _)| marker.map_or(true, |m| key.as_str() > m))
                    .take(page_size + 1)
                    .map(|(key, object)| to_record(key, object))
                    .collect()
            })
            .unwrap_or_default();

        let truncated = objects.len() > page_size;
        objects.truncate(page_size);
        Ok(ListPage { objects, truncated })
    }

    async fn copy_object(&self, request: &CopyRequest) -> Result<(), StorageError> {
        let _guard = self
            .enter(StoreCall::Copy(request.clone()), "CopyObject", &request.key)
            .await?;

        let mut inner = self.inner.lock().unwrap();
        let source = inner
            .buckets
            .get(&request.source_bucket)
            .and_then(|objects| objects.get(&request.source_key))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: request.source_bucket.clone(),
                key: request.source_key.clone(),
            })?;
        inner.buckets.entry(request.bucket.clone()).or_default().insert(
            request.key.clone(),
            MockObject {
                last_modified: Utc::now(),
                ..source
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, StorageError> {
        let call = StoreCall::Get {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let _guard = self.enter(call, "GetObject", key).await?;

        let data = self
            .object_data(bucket, key)
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;

        // Hand the body out in a few chunks so consumers exercise reassembly.
        let chunk_size = (data.len() / 3).max(1);
        let chunks: Vec<Result<Bytes, StorageError>> = (0..data.len())
            .step_by(chunk_size)
            .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
            .collect();
        Ok(futures_util::stream::iter(chunks).boxed())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        mut body: ObjectStream,
        content_length: u64,
    ) -> Result<(), StorageError> {
        let call = StoreCall::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_length,
        };
        let _guard = self.enter(call, "PutObject", key).await?;

        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.try_next().await? {
            buffer.extend_from_slice(&chunk);
        }
        let actual = buffer.len() as u64;
        if actual != content_length {
            return Err(StorageError::LengthMismatch {
                expected: content_length,
                actual,
            });
        }

        self.put_object(bucket, key, buffer.freeze(), Utc::now());
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let call = StoreCall::Delete {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let _guard = self.enter(call, "DeleteObject", key).await?;

        let mut inner = self.inner.lock().unwrap();
        if let Some(objects) = inner.buckets.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }
}

/// Hands out clones of one [`MockStore`] for every region and records which
/// regions were connected.
#[derive(Debug, Clone, Default)]
pub struct MockStoreFactory {
    store: MockStore,
    connected: Arc<Mutex<Vec<String>>>,
}

impl MockStoreFactory {
    /// Create a factory backed by `store`.
    pub fn new(store: MockStore) -> Self {
        Self {
            store,
            connected: Arc::default(),
        }
    }

    /// Region ids passed to `connect`, in order.
    pub fn connected(&self) -> Vec<String> {
        self.connected.lock().unwrap().clone()
    }
}

impl StoreFactory for MockStoreFactory {
    fn connect(&self, region: &RegionConfig) -> Arc<dyn ObjectStore> {
        self.connected.lock().unwrap().push(region.id.clone());
        Arc::new(self.store.clone())
    }
}

fn to_record(key: &str, object: &MockObject) -> ObjectRecord {
    ObjectRecord {
        key: key.to_string(),
        last_modified: object.last_modified,
        fingerprint: object.fingerprint.clone(),
        size: object.data.len() as u64,
    }
}

fn fingerprint_of(data: &[u8]) -> Fingerprint {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    Fingerprint::new(format!("\"{:016x}\"", hasher.finish()))
}

fn injected(operation: &'static str) -> StorageError {
    StorageError::Api {
        operation,
        message: "injected failure".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap()
    }

    async fn collect(mut body: ObjectStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = body.try_next().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn lists_with_prefix_and_pagination() {
        let store = MockStore::new().with_page_size(2);
        for key in ["p/a", "p/b", "p/c", "q/d"] {
            store.put_object("bucket", key, "x", t(0));
        }

        let first = store.list_page("bucket", "p/", None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert!(first.truncated);

        let second = store.list_page("bucket", "p/", Some("p/b")).await.unwrap();
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].key, "p/c");
        assert!(!second.truncated);
    }

    #[tokio::test]
    async fn missing_bucket_lists_empty() {
        let page = MockStore::new().list_page("nope", "", None).await.unwrap();
        assert!(page.objects.is_empty());
        assert!(!page.truncated);
    }

    #[tokio::test]
    async fn copy_preserves_fingerprint_and_restamps() {
        let store = MockStore::new();
        store.put_object("src", "in/a", "hello", t(0));

        store
            .copy_object(&CopyRequest::new("src", "in/a", "dest", "out/a"))
            .await
            .unwrap();

        let source = store.record("src", "in/a").unwrap();
        let copied = store.record("dest", "out/a").unwrap();
        assert_eq!(copied.fingerprint, source.fingerprint);
        assert!(copied.last_modified > source.last_modified);
        assert_eq!(store.object_data("dest", "out/a").unwrap(), "hello");
    }

    #[tokio::test]
    async fn copy_of_missing_source_fails() {
        let result = MockStore::new()
            .copy_object(&CopyRequest::new("src", "a", "dest", "a"))
            .await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn stream_round_trip() {
        let store = MockStore::new();
        store.put_object("src", "a", "0123456789", t(0));

        let body = store.get_object("src", "a").await.unwrap();
        store.upload("dest", "a", body, 10).await.unwrap();
        assert_eq!(store.object_data("dest", "a").unwrap(), "0123456789");

        let body = store.get_object("src", "a").await.unwrap();
        assert_eq!(collect(body).await, b"0123456789");
    }

    #[tokio::test]
    async fn upload_rejects_length_mismatch() {
        let store = MockStore::new();
        store.put_object("src", "a", "0123456789", t(0));
        let body = store.get_object("src", "a").await.unwrap();

        let result = store.upload("dest", "a", body, 11).await;
        assert!(matches!(
            result,
            Err(StorageError::LengthMismatch {
                expected: 11,
                actual: 10
            })
        ));
        assert!(store.object_data("dest", "a").is_none());
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = MockStore::new();
        store.put_object("src", "a", "x", t(0));
        store.fail_key("a");
        store.fail_listing("src");

        assert!(store.delete_object("dest", "a").await.is_err());
        assert!(store.list_page("src", "", None).await.is_err());
        assert_eq!(store.calls().len(), 2);
    }

    #[tokio::test]
    async fn delete_missing_object_succeeds() {
        let store = MockStore::new();
        store.delete_object("dest", "ghost").await.unwrap();
        assert_eq!(
            store.calls(),
            vec![StoreCall::Delete {
                bucket: "dest".into(),
                key: "ghost".into()
            }]
        );
    }

    #[tokio::test]
    async fn tracks_peak_concurrency() {
        let store = MockStore::new();
        store.set_latency(Duration::from_millis(20));

        let calls = (0..4).map(|i| {
            let store = store.clone();
            async move { store.delete_object("b", &format!("k{i}")).await }
        });
        for result in futures_util::future::join_all(calls).await {
            result.unwrap();
        }
        assert_eq!(store.peak_in_flight(), 4);
        assert_eq!(store.peak_in_flight_for("DeleteObject"), 4);
        assert_eq!(store.peak_in_flight_for("CopyObject"), 0);
    }

    #[tokio::test]
    async fn per_operation_gauge_drops_when_calls_finish() {
        let store = MockStore::new();
        for i in 0..3 {
            store.delete_object("b", &format!("k{i}")).await.unwrap();
        }
        assert_eq!(store.peak_in_flight_for("DeleteObject"), 1);
    }
}
