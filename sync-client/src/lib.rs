//! # sync-client
//!
//! Object-storage layer for bucket-sync.
//!
//! ## Features
//!
//! - **Storage Abstraction**: [`ObjectStore`] is the only surface the engine
//!   uses to talk to buckets (S3, in-memory mock)
//! - **Region Registry**: lazily built, process-wide regional clients with
//!   their logical account identity
//! - **Lister**: complete, paginated bucket/prefix listings
//!
//! ## Example
//!
//! ```ignore
//! use sync_client::{list_objects, RegionRegistry, S3StoreFactory};
//!
//! let factory = S3StoreFactory::new(base_config(None).await, WritePolicy::default());
//! let registry = RegionRegistry::new(regions, Arc::new(factory));
//! let region = registry.resolve("us-west-2")?;
//! let objects = list_objects(region.store(), "srcbucket", "srcfolder/").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lister;
pub mod registry;
pub mod store;

pub use lister::{list_objects, ListError};
pub use registry::{Region, RegionRegistry, RegistryError, StoreFactory};
pub use store::{
    base_config, CopyRequest, ListPage, MetadataDirective, MockStore, MockStoreFactory,
    ObjectStore, ObjectStream, S3Store, S3StoreFactory, StorageError, StoreCall, WritePolicy,
};
