//! One-shot full reconciliation.

use anyhow::{bail, Result};
use sync_engine::{CleanupOrder, Config, FullSync, SyncOptions, SyncReport};

use super::connect;

/// Run the sync command.
pub async fn run(config: &Config, dry_run: bool, cleanup_after_copy: bool) -> Result<()> {
    let mut options = SyncOptions::from(&config.sync);
    options.dry_run = dry_run;
    if cleanup_after_copy {
        options.cleanup_order = CleanupOrder::AfterCopy;
    }

    let (_, registry) = connect(config).await;
    let report = FullSync::new(registry, config.buckets.clone(), options)
        .run()
        .await;

    print_report(&report);

    if let Some(err) = report.first_error() {
        bail!("sync failed ({} failures): {}", report.failures(), err);
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!(
        "=== bucket-sync {} ===",
        if report.dry_run { "dry run" } else { "sync" }
    );
    for rule in &report.rules {
        match rule.source_keys {
            Some(keys) => println!("{} ({} keys)", rule.rule, keys),
            None => println!("{} (not listed)", rule.rule),
        }
        for dest in &rule.destinations {
            let status = if dest.is_success() { "ok" } else { "FAILED" };
            println!(
                "  -> {} [{}]: {} express, {} stream, {} touch, {} delete ({})",
                dest.bucket.as_deref().unwrap_or("?"),
                dest.region,
                dest.plan.express,
                dest.plan.stream,
                dest.plan.touches,
                dest.plan.deletes,
                status
            );
        }
    }
    println!("Finished in {:.1}s", report.duration.as_secs_f64());
}
