//! Run orchestration.
//!
//! Every supported catalog entry becomes an independent branch. Branches run
//! concurrently up to `global.max_concurrent_branches`; the run returns once
//! every branch has an outcome. A branch failing, panicking or timing out
//! never affects the others.

mod branch;
mod report;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tsn_ingest_core::{InternalEvent, KeyedRunner, TaskError};

use crate::catalog::CatalogEntry;
use crate::config::Config;
use crate::destination::DestinationStore;
use crate::error::BranchError;
use crate::lifecycle::ResourceLifecycleManager;
use crate::metrics::{BranchFinished, BranchStatus};
use crate::reconcile::DuplicatePolicy;
use crate::source::{FetchCache, SourceRegistry};

pub use report::{BranchOutcome, BranchReport, BranchSummary, RunReport, SkippedEntry};

/// Knobs that shape a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSettings {
    /// Timeout for each individual network call.
    pub call_timeout: Duration,
    /// Maximum branches doing work at once (`None` = unbounded).
    pub max_concurrent_branches: Option<usize>,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            max_concurrent_branches: None,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            call_timeout: config.global.call_timeout(),
            max_concurrent_branches: config.global.max_concurrent_branches,
            duplicate_policy: config.ingest.duplicate_policy,
        }
    }
}

/// Shared handles every branch of a run works with.
#[derive(Clone)]
pub struct IngestContext {
    pub store: Arc<dyn DestinationStore>,
    pub lifecycle: Arc<ResourceLifecycleManager>,
    pub fetch_cache: Arc<FetchCache>,
    pub settings: IngestSettings,
    pub shutdown: CancellationToken,
}

impl IngestContext {
    /// Build the per-run lifecycle manager and fetch cache around `store`
    /// and `registry`.
    pub fn new(
        store: Arc<dyn DestinationStore>,
        registry: Arc<SourceRegistry>,
        settings: IngestSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let lifecycle = Arc::new(ResourceLifecycleManager::new(
            Arc::clone(&store),
            settings.call_timeout,
            shutdown.clone(),
        ));
        let fetch_cache = Arc::new(FetchCache::new(registry, settings.call_timeout, shutdown.clone()));
        Self {
            store,
            lifecycle,
            fetch_cache,
            settings,
            shutdown,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        self.fetch_cache.registry()
    }
}

/// Runs a catalog to completion.
pub struct IngestRunner {
    ctx: IngestContext,
}

impl IngestRunner {
    pub fn new(ctx: IngestContext) -> Self {
        Self { ctx }
    }

    /// Split `entries` into runnable branches and skipped entries.
    pub fn plan(&self, entries: Vec<CatalogEntry>) -> (Vec<CatalogEntry>, Vec<SkippedEntry>) {
        let registry = self.ctx.registry();
        let (runnable, unsupported): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|e| registry.supports(&e.source_type.provider));

        let skipped = unsupported
            .into_iter()
            .map(|entry| {
                info!(entry = %entry, provider = %entry.source_type.provider, "Skipping entry with unsupported provider");
                SkippedEntry {
                    reason: format!("unsupported provider '{}'", entry.source_type.provider),
                    entry,
                }
            })
            .collect();

        (runnable, skipped)
    }

    /// Run every supported entry and wait for all of them.
    pub async fn run(self, entries: Vec<CatalogEntry>) -> RunReport {
        let (runnable, skipped) = self.plan(entries);

        info!(
            branches = runnable.len(),
            skipped = skipped.len(),
            max_concurrent = ?self.ctx.settings.max_concurrent_branches,
            "Starting ingestion run"
        );

        let mut runner = KeyedRunner::new(
            self.ctx.settings.max_concurrent_branches,
            self.ctx.shutdown.clone(),
            "branch",
        );
        for entry in runnable {
            runner.push(entry.clone(), branch::run(self.ctx.clone(), entry));
        }

        let branches = runner
            .join_all()
            .await
            .into_iter()
            .map(|(entry, result)| {
                let outcome = match result {
                    Ok(summary) => BranchOutcome::Succeeded(summary),
                    Err(TaskError::Cancelled) => BranchOutcome::Cancelled,
                    Err(TaskError::Panicked(message)) => {
                        BranchOutcome::Failed(BranchError::Panicked { message })
                    }
                    Err(TaskError::Failed(e)) if e.is_cancelled() => BranchOutcome::Cancelled,
                    Err(TaskError::Failed(e)) => BranchOutcome::Failed(e),
                };
                let status = match &outcome {
                    BranchOutcome::Succeeded(_) => BranchStatus::Succeeded,
                    BranchOutcome::Failed(_) => BranchStatus::Failed,
                    BranchOutcome::Cancelled => BranchStatus::Cancelled,
                };
                BranchFinished { status }.emit();
                BranchReport { entry, outcome }
            })
            .collect();

        let report = RunReport { branches, skipped };
        info!(
            succeeded = report.succeeded(),
            failed = report.failures().count(),
            written = report.total_written(),
            "Ingestion run finished"
        );
        report
    }
}
