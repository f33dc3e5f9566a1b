#![allow(dead_code)]

use std::sync::Arc;
use sync_client::{MockStore, MockStoreFactory, RegionRegistry};
use sync_types::{BucketRule, RegionConfig};

/// Three regions; `cn-north-1` authenticates as a separate account.
pub fn regions() -> Vec<RegionConfig> {
    vec![
        RegionConfig::new("us-west-2", ""),
        RegionConfig::new("eu-west-1", ".euw1"),
        RegionConfig::new("cn-north-1", ".cn").with_credentials("AKIACN", "cn-secret"),
    ]
}

pub fn registry(store: &MockStore) -> Arc<RegionRegistry> {
    Arc::new(RegionRegistry::new(
        regions(),
        Arc::new(MockStoreFactory::new(store.clone())),
    ))
}

pub fn rule(source_bucket: &str, dest_regions: &[&str]) -> BucketRule {
    BucketRule {
        source_bucket: source_bucket.into(),
        source_prefix: "srcfolder/".into(),
        source_region: "us-west-2".into(),
        dest_bucket: "destbucket".into(),
        dest_prefix: "destfolder/".into(),
        dest_regions: dest_regions.iter().map(|r| r.to_string()).collect(),
    }
}
