//! Complete prefix listings.

use crate::store::{ObjectStore, StorageError};
use sync_types::ObjectMap;
use thiserror::Error;

/// A listing that could not be completed.
#[derive(Debug, Error)]
#[error("listing {bucket}/{prefix} failed: {source}")]
pub struct ListError {
    /// Bucket being listed.
    pub bucket: String,
    /// Prefix being listed.
    pub prefix: String,
    /// Underlying storage failure.
    #[source]
    pub source: StorageError,
}

/// List every object in `bucket` under `prefix`.
///
/// Pages are requested one after another, each starting after the last key
/// of the previous page. Any page failure aborts the whole listing; partial
/// results are never returned.
pub async fn list_objects(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
) -> Result<ObjectMap, ListError> {
    let fail = |source| ListError {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
        source,
    };

    tracing::debug!("Scanning bucket [{}/{}]", bucket, prefix);

    let mut objects = ObjectMap::new();
    let mut marker: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store
            .list_page(bucket, prefix, marker.as_deref())
            .await
            .map_err(fail)?;
        pages += 1;

        let last_key = page.objects.last().map(|object| object.key.clone());
        for object in page.objects {
            objects.insert(object.key.clone(), object);
        }

        if !page.truncated {
            break;
        }
        match last_key {
            Some(key) => marker = Some(key),
            None => {
                return Err(fail(StorageError::Malformed(
                    "truncated listing page without entries".into(),
                )))
            }
        }
    }

    tracing::debug!(
        "Scanned bucket [{}/{}]: {} objects in {} pages",
        bucket,
        prefix,
        objects.len(),
        pages
    );
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MockStore, StoreCall};
    use chrono::Utc;

    #[tokio::test]
    async fn follows_pagination_to_the_end() {
        let store = MockStore::new().with_page_size(2);
        for i in 0..5 {
            store.put_object("bucket", &format!("p/{i}"), "x", Utc::now());
        }
        store.put_object("bucket", "other/skip", "x", Utc::now());

        let objects = list_objects(&store, "bucket", "p/").await.unwrap();
        assert_eq!(objects.len(), 5);
        assert!(objects.contains_key("p/4"));
        assert!(!objects.contains_key("other/skip"));

        let lists = store
            .calls()
            .into_iter()
            .filter(|call| matches!(call, StoreCall::List { .. }))
            .count();
        assert_eq!(lists, 3);
    }

    #[tokio::test]
    async fn empty_prefix_lists_nothing() {
        let store = MockStore::new();
        let objects = list_objects(&store, "bucket", "p/").await.unwrap();
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn page_failure_aborts_listing() {
        let store = MockStore::new();
        store.put_object("bucket", "p/a", "x", Utc::now());
        store.fail_listing("bucket");

        let err = list_objects(&store, "bucket", "p/").await.unwrap_err();
        assert_eq!(err.bucket, "bucket");
        assert_eq!(err.prefix, "p/");
        assert!(matches!(err.source, StorageError::Api { .. }));
    }
}
