//! Lazily connected per-region store clients.
//!
//! A [`RegionRegistry`] is built once per run from the configured region
//! table. Each region's client is created on first use and shared by every
//! action that touches that region afterwards.

use crate::store::ObjectStore;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use sync_types::{AccountId, RegionConfig};
use thiserror::Error;

/// Registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A rule references a region that is not configured.
    #[error("unknown region: {region}")]
    UnknownRegion {
        /// Region id that failed to resolve.
        region: String,
    },
}

/// Creates the store client for one region.
pub trait StoreFactory: Send + Sync {
    /// Connect to `region` with its credentials, or the base account's.
    fn connect(&self, region: &RegionConfig) -> Arc<dyn ObjectStore>;
}

/// A connected region.
pub struct Region {
    config: RegionConfig,
    account: AccountId,
    store: Arc<dyn ObjectStore>,
}

impl Region {
    /// Region id (e.g. `eu-west-1`).
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Suffix appended to bucket base names in this region.
    pub fn suffix(&self) -> &str {
        &self.config.suffix
    }

    /// Account the region's credentials belong to.
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Store client for this region.
    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Physical bucket name for `base` in this region.
    pub fn bucket_name(&self, base: &str) -> String {
        format!("{}{}", base, self.config.suffix)
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.config.id)
            .field("suffix", &self.config.suffix)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

/// Region table with lazily created, cached clients.
pub struct RegionRegistry {
    table: HashMap<String, RegionConfig>,
    regions: DashMap<String, Arc<Region>>,
    factory: Arc<dyn StoreFactory>,
}

impl RegionRegistry {
    /// Create a registry over `regions`. Later entries with a duplicate id
    /// replace earlier ones; configuration validation rejects duplicates.
    pub fn new(
        regions: impl IntoIterator<Item = RegionConfig>,
        factory: Arc<dyn StoreFactory>,
    ) -> Self {
        let table = regions
            .into_iter()
            .map(|region| (region.id.clone(), region))
            .collect();
        Self {
            table,
            regions: DashMap::new(),
            factory,
        }
    }

    /// Check whether `id` is a configured region.
    pub fn contains(&self, id: &str) -> bool {
        self.table.contains_key(id)
    }

    /// Number of configured regions.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check whether no regions are configured.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Resolve a region, connecting its client on first use.
    ///
    /// Concurrent first calls for the same id connect exactly once.
    pub fn resolve(&self, id: &str) -> Result<Arc<Region>, RegistryError> {
        if let Some(region) = self.regions.get(id) {
            return Ok(Arc::clone(region.value()));
        }

        let config = self
            .table
            .get(id)
            .ok_or_else(|| RegistryError::UnknownRegion {
                region: id.to_string(),
            })?;

        let region = self
            .regions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!("Initialising client for region {}", id);
                Arc::new(Region {
                    account: config.account(),
                    store: self.factory.connect(config),
                    config: config.clone(),
                })
            })
            .value()
            .clone();
        Ok(region)
    }
}

impl fmt::Debug for RegionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.table.keys().collect();
        ids.sort();
        f.debug_struct("RegionRegistry")
            .field("regions", &ids)
            .field("connected", &self.regions.len())
            .finish()
    }
}
