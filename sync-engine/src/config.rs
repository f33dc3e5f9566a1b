//! Configuration loading for bucket-sync.
//!
//! Configuration is loaded from a TOML file (default: `bucket-sync.toml`).
//! See `bucket-sync.example.toml` at the crate root for every setting.

use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use sync_client::WritePolicy;
use sync_types::{BucketRule, RegionConfig};

/// Root configuration for bucket-sync.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Base account credentials.
    #[serde(default)]
    pub aws: AwsConfig,
    /// Region table.
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
    /// Replication rules.
    #[serde(default)]
    pub buckets: Vec<BucketRule>,
    /// Notification queue, required by `watch`.
    pub queue: Option<QueueConfig>,
    /// Full-sync tuning and write policy.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Base account credentials.
///
/// When absent the AWS default provider chain is used (environment, shared
/// profile, instance role).
#[derive(Clone, Default, Deserialize)]
pub struct AwsConfig {
    /// Access key id.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
}

impl AwsConfig {
    /// Static credentials as `(access_key_id, secret_access_key)`, if both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (
            self.access_key_id.as_deref(),
            self.secret_access_key.as_deref(),
        ) {
            (Some(access), Some(secret)) if !access.is_empty() => Some((access, secret)),
            _ => None,
        }
    }

    fn has_partial_credentials(&self) -> bool {
        let set = |v: Option<&str>| v.is_some_and(|v| !v.is_empty());
        set(self.access_key_id.as_deref()) != set(self.secret_access_key.as_deref())
    }
}

impl fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsConfig")
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Notification queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Queue URL.
    pub url: String,
    /// Region the queue lives in.
    pub region: String,
    /// Messages requested per receive (1-10, default: 10).
    #[serde(default = "default_batch_size")]
    pub batch_size: i32,
    /// Long-poll wait in seconds (0-20, default: 20).
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: i32,
}

/// When a destination's delete phase runs relative to its copy phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupOrder {
    /// Both phases start together.
    ///
    /// A key written and then deleted at the source while a run is in flight
    /// can be copied by one phase after the other phase has already decided
    /// about it.
    #[default]
    Concurrent,
    /// Deletes start once every copy and touch has settled.
    AfterCopy,
}

/// Full-sync tuning and write policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Copy/touch actions in flight per destination (default: 100).
    #[serde(default = "default_copy_concurrency")]
    pub copy_concurrency: usize,
    /// Delete actions in flight per destination (default: 50).
    #[serde(default = "default_delete_concurrency")]
    pub delete_concurrency: usize,
    /// Phase ordering (default: concurrent).
    #[serde(default)]
    pub cleanup_order: CleanupOrder,
    /// Server-side encryption for every write (default: AES256).
    #[serde(default = "default_server_side_encryption")]
    pub server_side_encryption: String,
    /// Storage class for every write (default: REDUCED_REDUNDANCY).
    #[serde(default = "default_storage_class")]
    pub storage_class: String,
}

impl SyncConfig {
    /// Write policy applied by the store clients.
    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy {
            server_side_encryption: self.server_side_encryption.clone(),
            storage_class: self.storage_class.clone(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (default: info). `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_batch_size() -> i32 {
    10
}

fn default_wait_time_secs() -> i32 {
    20
}

fn default_copy_concurrency() -> usize {
    100
}

fn default_delete_concurrency() -> usize {
    50
}

fn default_server_side_encryption() -> String {
    "AES256".to_string()
}

fn default_storage_class() -> String {
    "REDUCED_REDUNDANCY".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            copy_concurrency: default_copy_concurrency(),
            delete_concurrency: default_delete_concurrency(),
            cleanup_order: CleanupOrder::default(),
            server_side_encryption: default_server_side_encryption(),
            storage_class: default_storage_class(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for mistakes that would otherwise surface
    /// halfway through a run.
    ///
    /// # Errors
    ///
    /// - an access key without its secret key, or the reverse
    /// - duplicate region ids
    /// - a rule naming a region missing from the region table
    /// - a zero concurrency limit
    /// - queue settings outside what the queue service accepts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aws.has_partial_credentials() {
            return Err(ConfigError::IncompleteCredentials {
                scope: "aws".to_string(),
            });
        }

        let mut regions = HashSet::new();
        for region in &self.regions {
            if region.has_partial_credentials() {
                return Err(ConfigError::IncompleteCredentials {
                    scope: format!("region {}", region.id),
                });
            }
            if !regions.insert(region.id.as_str()) {
                return Err(ConfigError::DuplicateRegion {
                    region: region.id.clone(),
                });
            }
        }

        for rule in &self.buckets {
            let referenced =
                std::iter::once(&rule.source_region).chain(rule.dest_regions.iter());
            for region in referenced {
                if !regions.contains(region.as_str()) {
                    return Err(ConfigError::UnknownRegion {
                        rule: rule.label(),
                        region: region.clone(),
                    });
                }
            }
        }

        if self.sync.copy_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency {
                setting: "sync.copy_concurrency",
            });
        }
        if self.sync.delete_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency {
                setting: "sync.delete_concurrency",
            });
        }

        if let Some(queue) = &self.queue {
            check_range("queue.batch_size", queue.batch_size, 1, 10)?;
            check_range("queue.wait_time_secs", queue.wait_time_secs, 0, 20)?;
        }

        Ok(())
    }

    /// Require a `[queue]` section.
    pub fn queue(&self) -> Result<&QueueConfig, ConfigError> {
        self.queue.as_ref().ok_or(ConfigError::MissingQueue)
    }
}

fn check_range(setting: &'static str, value: i32, min: i32, max: i32) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            setting,
            value: i64::from(value),
            min: i64::from(min),
            max: i64::from(max),
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Only one half of an access key / secret key pair is set.
    #[error("{scope}: access key and secret key must be set together")]
    IncompleteCredentials {
        /// `aws` or `region <id>`.
        scope: String,
    },
    /// The same region id appears twice in the region table.
    #[error("region {region} is configured more than once")]
    DuplicateRegion {
        /// Duplicated region id.
        region: String,
    },
    /// A rule references a region missing from the region table.
    #[error("rule {rule} references unknown region {region}")]
    UnknownRegion {
        /// Rule label.
        rule: String,
        /// Missing region id.
        region: String,
    },
    /// A concurrency limit is zero.
    #[error("{setting} must be at least 1")]
    ZeroConcurrency {
        /// Setting name.
        setting: &'static str,
    },
    /// A numeric setting is outside its accepted range.
    #[error("{setting} = {value} is outside {min}..={max}")]
    OutOfRange {
        /// Setting name.
        setting: &'static str,
        /// Configured value.
        value: i64,
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },
    /// The command needs a `[queue]` section.
    #[error("no [queue] section configured")]
    MissingQueue,
}
