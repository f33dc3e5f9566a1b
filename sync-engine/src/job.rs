//! Listing one rule's source and destinations.

use crate::error::{EngineError, Result};
use futures_util::future::join_all;
use std::sync::Arc;
use sync_client::{list_objects, Region, RegionRegistry};
use sync_types::{BucketRule, Snapshot};

/// A listed bucket/prefix in one region.
#[derive(Debug)]
pub struct BucketView {
    /// Region the bucket lives in.
    pub region: Arc<Region>,
    /// Physical bucket name.
    pub bucket: String,
    /// Listing taken at load time.
    pub snapshot: Snapshot,
}

impl BucketView {
    /// Resolve `region_id` and list `bucket` under `prefix`.
    pub async fn load(
        registry: &RegionRegistry,
        region_id: &str,
        bucket: String,
        prefix: &str,
    ) -> Result<Self> {
        let region = registry.resolve(region_id)?;
        let objects = list_objects(region.store(), &bucket, prefix).await?;
        tracing::info!(
            "Listed {} keys in {}/{} ({})",
            objects.len(),
            bucket,
            prefix,
            region.id()
        );
        Ok(Self {
            snapshot: Snapshot::new(region.account().clone(), objects),
            region,
            bucket,
        })
    }
}

/// One destination of a [`SyncJob`].
#[derive(Debug)]
pub struct DestinationListing {
    /// Destination region id.
    pub region_id: String,
    /// Destination bucket, if the region resolved.
    pub bucket: Option<String>,
    /// Listing, or why it could not be taken.
    pub view: Result<BucketView>,
}

/// Everything needed to plan one rule.
#[derive(Debug)]
pub struct SyncJob {
    /// Rule being synchronised.
    pub rule: Arc<BucketRule>,
    /// Source listing.
    pub source: BucketView,
    /// Destination listings, in the rule's region order.
    pub destinations: Vec<DestinationListing>,
}

impl SyncJob {
    /// List the source and every destination of `rule` in parallel.
    ///
    /// # Errors
    ///
    /// Fails only if the source cannot be listed. Destination failures are
    /// kept per destination so the others can still be synchronised.
    pub async fn load(rule: Arc<BucketRule>, registry: &RegionRegistry) -> Result<Self> {
        let source = BucketView::load(
            registry,
            &rule.source_region,
            rule.source_bucket.clone(),
            &rule.source_prefix,
        );
        let destinations = join_all(rule.dest_regions.iter().map(|region_id| {
            let rule = &rule;
            async move {
                let (bucket, view) = match registry.resolve(region_id) {
                    Ok(region) => {
                        let bucket = rule.dest_bucket_name(region.suffix());
                        let view =
                            BucketView::load(registry, region_id, bucket.clone(), &rule.dest_prefix)
                                .await;
                        (Some(bucket), view)
                    }
                    Err(e) => (None, Err(EngineError::from(e))),
                };
                DestinationListing {
                    region_id: region_id.clone(),
                    bucket,
                    view,
                }
            }
        }));

        let (source, destinations) = futures_util::join!(source, destinations);
        Ok(Self {
            source: source?,
            destinations,
            rule,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sync_client::{MockStore, MockStoreFactory};
    use sync_types::RegionConfig;

    fn registry(store: &MockStore) -> RegionRegistry {
        RegionRegistry::new(
            vec![
                RegionConfig::new("us-west-2", ""),
                RegionConfig::new("eu-west-1", ".euw1"),
                RegionConfig::new("ap-south-1", ".aps1"),
            ],
            Arc::new(MockStoreFactory::new(store.clone())),
        )
    }

    fn rule() -> Arc<BucketRule> {
        Arc::new(BucketRule {
            source_bucket: "src".into(),
            source_prefix: "in/".into(),
            source_region: "us-west-2".into(),
            dest_bucket: "dest".into(),
            dest_prefix: "out/".into(),
            dest_regions: vec!["eu-west-1".into(), "ap-south-1".into()],
        })
    }

    #[tokio::test]
    async fn lists_source_and_destinations() {
        let store = MockStore::new();
        store.put_object("src", "in/a", "x", Utc::now());
        store.put_object("src", "in/b", "x", Utc::now());
        store.put_object("dest.euw1", "out/a", "x", Utc::now());

        let job = SyncJob::load(rule(), &registry(&store)).await.unwrap();
        assert_eq!(job.source.snapshot.len(), 2);
        assert_eq!(job.destinations.len(), 2);
        assert_eq!(job.destinations[0].region_id, "eu-west-1");
        let euw1 = job.destinations[0].view.as_ref().unwrap();
        assert_eq!(euw1.bucket, "dest.euw1");
        assert_eq!(euw1.snapshot.len(), 1);
        let aps1 = job.destinations[1].view.as_ref().unwrap();
        assert!(aps1.snapshot.is_empty());
    }

    #[tokio::test]
    async fn destination_failure_is_isolated() {
        let store = MockStore::new();
        store.put_object("src", "in/a", "x", Utc::now());
        store.fail_listing("dest.aps1");

        let job = SyncJob::load(rule(), &registry(&store)).await.unwrap();
        assert!(job.destinations[0].view.is_ok());
        assert_eq!(job.destinations[1].bucket.as_deref(), Some("dest.aps1"));
        assert!(matches!(
            job.destinations[1].view,
            Err(EngineError::List(_))
        ));
    }

    #[tokio::test]
    async fn source_failure_fails_the_job() {
        let store = MockStore::new();
        store.fail_listing("src");
        let err = SyncJob::load(rule(), &registry(&store)).await.unwrap_err();
        assert!(matches!(err, EngineError::List(_)));
    }
}
