//! Full reconciliation of every configured rule.
//!
//! ```text
//! rule ──► list source ─┬─► plan ─► copy/touch phase ─┐
//!          list dest A ─┘          delete phase ──────┴─► DestinationReport
//!          list dest B ───► ...
//! ```
//!
//! Rules run concurrently, and so do the destinations of a rule. A failure
//! stays with the rule or destination it happened in.

use crate::config::{CleanupOrder, SyncConfig};
use crate::error::EngineError;
use crate::executor::{execute, Execution};
use crate::job::{BucketView, SyncJob};
use crate::transfer::Transfer;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sync_client::RegionRegistry;
use sync_core::{plan, Plan, PlanSummary};
use sync_types::{Action, BucketRule};

/// Run options for [`FullSync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Copy/touch actions in flight per destination.
    pub copy_concurrency: usize,
    /// Delete actions in flight per destination.
    pub delete_concurrency: usize,
    /// Phase ordering.
    pub cleanup_order: CleanupOrder,
    /// Plan and log without writing anything.
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            copy_concurrency: config.copy_concurrency,
            delete_concurrency: config.delete_concurrency,
            cleanup_order: config.cleanup_order,
            dry_run: false,
        }
    }
}

/// Counters for one execution phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseReport {
    /// Actions planned for the phase.
    pub planned: usize,
    /// Actions launched.
    pub started: usize,
    /// Actions that succeeded.
    pub completed: usize,
    /// Actions that failed.
    pub failed: usize,
}

impl PhaseReport {
    fn new<E>(planned: usize, execution: &Execution<E>) -> Self {
        Self {
            planned,
            started: execution.started,
            completed: execution.completed,
            failed: execution.failed,
        }
    }
}

/// Outcome for one destination region of a rule.
#[derive(Debug)]
pub struct DestinationReport {
    /// Destination region id.
    pub region: String,
    /// Destination bucket, if the region resolved.
    pub bucket: Option<String>,
    /// Keys listed in the destination, if the listing succeeded.
    pub keys: Option<usize>,
    /// Planned actions.
    pub plan: PlanSummary,
    /// Copy/touch phase counters.
    pub forward: PhaseReport,
    /// Delete phase counters.
    pub cleanup: PhaseReport,
    /// First failure in this destination.
    pub error: Option<EngineError>,
}

impl DestinationReport {
    fn failed(region: String, bucket: Option<String>, error: EngineError) -> Self {
        Self {
            region,
            bucket,
            keys: None,
            plan: PlanSummary::default(),
            forward: PhaseReport::default(),
            cleanup: PhaseReport::default(),
            error: Some(error),
        }
    }

    /// Check whether the destination converged without errors.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome for one rule.
#[derive(Debug)]
pub struct RuleReport {
    /// Rule label (`bucket/prefix`).
    pub rule: String,
    /// Keys listed in the source, if the listing succeeded.
    pub source_keys: Option<usize>,
    /// Source-side failure; no destination was touched.
    pub error: Option<EngineError>,
    /// Per-destination outcomes.
    pub destinations: Vec<DestinationReport>,
}

impl RuleReport {
    /// Check whether the rule and all its destinations succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.destinations.iter().all(DestinationReport::is_success)
    }

    /// First failure in this rule.
    pub fn first_error(&self) -> Option<&EngineError> {
        self.error
            .as_ref()
            .or_else(|| self.destinations.iter().find_map(|d| d.error.as_ref()))
    }
}

/// Outcome of a whole run.
#[derive(Debug)]
pub struct SyncReport {
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Whether the run was a dry run.
    pub dry_run: bool,
    /// Per-rule outcomes, in configuration order.
    pub rules: Vec<RuleReport>,
}

impl SyncReport {
    /// Check whether every rule succeeded.
    pub fn is_success(&self) -> bool {
        self.rules.iter().all(RuleReport::is_success)
    }

    /// First failure across the run, in configuration order.
    pub fn first_error(&self) -> Option<&EngineError> {
        self.rules.iter().find_map(RuleReport::first_error)
    }

    /// Number of failed rules or destinations.
    pub fn failures(&self) -> usize {
        self.rules
            .iter()
            .map(|rule| {
                usize::from(rule.error.is_some())
                    + rule.destinations.iter().filter(|d| !d.is_success()).count()
            })
            .sum()
    }

    /// Planned actions summed over every destination.
    pub fn planned(&self) -> PlanSummary {
        let mut total = PlanSummary::default();
        for destination in self.rules.iter().flat_map(|rule| &rule.destinations) {
            total.express += destination.plan.express;
            total.stream += destination.plan.stream;
            total.touches += destination.plan.touches;
            total.deletes += destination.plan.deletes;
        }
        total
    }
}

/// Full reconciliation over a set of rules.
#[derive(Debug)]
pub struct FullSync {
    registry: Arc<RegionRegistry>,
    rules: Vec<Arc<BucketRule>>,
    options: SyncOptions,
}

impl FullSync {
    /// Create a run over `rules`.
    pub fn new(
        registry: Arc<RegionRegistry>,
        rules: impl IntoIterator<Item = BucketRule>,
        options: SyncOptions,
    ) -> Self {
        Self {
            registry,
            rules: rules.into_iter().map(Arc::new).collect(),
            options,
        }
    }

    /// Synchronise every rule and report the outcome.
    pub async fn run(&self) -> SyncReport {
        let started = Instant::now();
        tracing::info!(
            "Full sync started: {} rules{}",
            self.rules.len(),
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let rules = join_all(self.rules.iter().map(|rule| self.sync_rule(Arc::clone(rule)))).await;
        let report = SyncReport {
            duration: started.elapsed(),
            dry_run: self.options.dry_run,
            rules,
        };

        let planned = report.planned();
        if report.is_success() {
            tracing::info!(
                "Full sync finished in {:.1}s: {} express, {} stream, {} touch, {} delete",
                report.duration.as_secs_f64(),
                planned.express,
                planned.stream,
                planned.touches,
                planned.deletes
            );
        } else {
            tracing::warn!(
                "Full sync finished in {:.1}s with {} failures",
                report.duration.as_secs_f64(),
                report.failures()
            );
            if let Some(err) = report.first_error() {
                tracing::error!("First error: {}", err);
            }
        }
        report
    }

    async fn sync_rule(&self, rule: Arc<BucketRule>) -> RuleReport {
        let label = rule.label();
        let job = match SyncJob::load(Arc::clone(&rule), &self.registry).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!("Sync of {} failed: {}", label, e);
                return RuleReport {
                    rule: label,
                    source_keys: None,
                    error: Some(e),
                    destinations: Vec::new(),
                };
            }
        };

        let SyncJob {
            rule,
            source,
            destinations,
        } = job;
        let (rule, source, label_ref) = (&rule, &source, &label);
        let destinations = join_all(destinations.into_iter().map(|listing| async move {
            match listing.view {
                Ok(view) => self.sync_destination(rule, source, view).await,
                Err(e) => {
                    tracing::error!(
                        "Sync of {} to {} failed: {}",
                        label_ref,
                        listing.region_id,
                        e
                    );
                    DestinationReport::failed(listing.region_id, listing.bucket, e)
                }
            }
        }))
        .await;

        RuleReport {
            source_keys: Some(source.snapshot.len()),
            rule: label,
            error: None,
            destinations,
        }
    }

    async fn sync_destination(
        &self,
        rule: &Arc<BucketRule>,
        source: &BucketView,
        dest: BucketView,
    ) -> DestinationReport {
        let plan = plan(rule, &source.snapshot, &dest.snapshot);
        let summary = plan.summary();
        tracing::info!(
            "Syncing [{} --> {}] ({}): {} express, {} stream, {} touch, {} delete",
            source.bucket,
            dest.bucket,
            dest.region.id(),
            summary.express,
            summary.stream,
            summary.touches,
            summary.deletes
        );

        let mut report = DestinationReport {
            region: dest.region.id().to_string(),
            bucket: Some(dest.bucket.clone()),
            keys: Some(dest.snapshot.len()),
            plan: summary,
            forward: PhaseReport::default(),
            cleanup: PhaseReport::default(),
            error: None,
        };

        if self.options.dry_run {
            for action in plan.iter() {
                tracing::info!("[dry run] {} -> {}: {}", source.bucket, dest.bucket, action);
            }
            return report;
        }
        if plan.is_empty() {
            return report;
        }

        let transfer = Arc::new(Transfer::new(
            Arc::clone(rule),
            Arc::clone(&source.region),
            Arc::clone(&dest.region),
        ));
        let (forward, cleanup) = self.execute_plan(&transfer, plan).await;

        report.forward = PhaseReport::new(forward.0, &forward.1);
        report.cleanup = PhaseReport::new(cleanup.0, &cleanup.1);
        report.error = forward.1.first_error.or(cleanup.1.first_error);
        if let Some(e) = &report.error {
            tracing::error!(
                "Sync of [{} --> {}] failed: {}",
                source.bucket,
                dest.bucket,
                e
            );
        }
        report
    }

    /// Run both phases of `plan`, returning each phase's planned count and
    /// execution.
    async fn execute_plan(
        &self,
        transfer: &Arc<Transfer>,
        plan: Plan,
    ) -> (
        (usize, Execution<EngineError>),
        (usize, Execution<EngineError>),
    ) {
        let Plan { forward, cleanup } = plan;
        let (forward_len, cleanup_len) = (forward.len(), cleanup.len());
        let forward_phase = run_phase(transfer, forward, self.options.copy_concurrency);
        let cleanup_phase = run_phase(transfer, cleanup, self.options.delete_concurrency);

        let (forward, cleanup) = match self.options.cleanup_order {
            CleanupOrder::Concurrent => tokio::join!(forward_phase, cleanup_phase),
            CleanupOrder::AfterCopy => {
                let forward = forward_phase.await;
                (forward, cleanup_phase.await)
            }
        };
        ((forward_len, forward), (cleanup_len, cleanup))
    }
}

async fn run_phase(
    transfer: &Arc<Transfer>,
    actions: Vec<Action>,
    limit: usize,
) -> Execution<EngineError> {
    execute(actions, limit, |action| {
        let transfer = Arc::clone(transfer);
        async move { transfer.apply(&action).await }
    })
    .await
}
