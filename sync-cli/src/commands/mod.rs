//! CLI command implementations.

pub mod sync;
pub mod watch;

use aws_config::SdkConfig;
use std::sync::Arc;
use sync_client::{base_config, RegionRegistry, S3StoreFactory};
use sync_engine::Config;

/// Load the base AWS configuration and build the region registry.
pub async fn connect(config: &Config) -> (SdkConfig, Arc<RegionRegistry>) {
    let sdk = base_config(config.aws.credentials()).await;
    let factory = S3StoreFactory::new(sdk.clone(), config.sync.write_policy());
    let registry = RegionRegistry::new(config.regions.clone(), Arc::new(factory));
    (sdk, Arc::new(registry))
}
