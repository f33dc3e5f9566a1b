//! # bucket-sync
//!
//! Replicate S3 buckets across regions and accounts.
//!
//! ## Commands
//!
//! - `sync`: Reconcile every configured rule once
//! - `watch`: Apply bucket notifications from the queue until interrupted
//!
//! ## Example
//!
//! ```bash
//! # See what a full sync would do
//! bucket-sync --config bucket-sync.toml sync --dry-run
//!
//! # Reconcile, deleting only after all copies settled
//! bucket-sync sync --cleanup-after-copy
//!
//! # Follow notifications
//! bucket-sync watch
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use sync_engine::Config;
use tracing_subscriber::EnvFilter;

mod commands;

/// Replicate S3 buckets across regions and accounts.
#[derive(Parser, Debug)]
#[command(name = "bucket-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(
        long,
        short,
        global = true,
        env = "BUCKET_SYNC_CONFIG",
        default_value = "bucket-sync.toml"
    )]
    config: PathBuf,

    /// Log filter (e.g. `debug`, `sync_engine=trace`); overrides `RUST_LOG` and `[logging] level`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile every configured rule once
    Sync {
        /// Plan and log actions without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Start deletes only after all copies have settled
        #[arg(long)]
        cleanup_after_copy: bool,
    },

    /// Apply bucket notifications from the queue until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    init_logging(cli.log_level.as_deref(), &config.logging.level);

    match cli.command {
        Commands::Sync {
            dry_run,
            cleanup_after_copy,
        } => {
            commands::sync::run(&config, dry_run, cleanup_after_copy).await?;
        }
        Commands::Watch => {
            commands::watch::run(&config).await?;
        }
    }

    Ok(())
}

/// Install the global subscriber.
fn init_logging(flag: Option<&str>, configured: &str) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = log_directives(flag, env, configured);
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(configured));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// `--log-level` first, then `RUST_LOG`, then `[logging] level`.
fn log_directives(flag: Option<&str>, env: Option<String>, configured: &str) -> String {
    match (flag, env) {
        (Some(flag), _) => flag.to_string(),
        (None, Some(env)) if !env.trim().is_empty() => env,
        _ => configured.to_string(),
    }
}
