//! One catalog entry's work.
//!
//! ```text
//! ensure_ready ──> read_existing ──┐
//!                                  ├──> dedup ──> reconcile ──> write
//! fetch ──> normalize ──> filter ──┘
//! ```
//!
//! The two chains run concurrently. Reading existing records needs the
//! [`ResourceReady`] token, so it can only start once the resource is ready.
//! Fetch and normalize happen once per sheet in the shared fetch cache.

use std::future::Future;

use snafu::prelude::*;
use tracing::{debug, info, instrument};
use tsn_ingest_core::{CallInterrupt, InternalEvent, bounded_call};

use super::IngestContext;
use super::report::BranchSummary;
use crate::catalog::CatalogEntry;
use crate::error::{BranchError, ReadExistingSnafu, ResourceSnafu, WriteSnafu};
use crate::lifecycle::ResourceReady;
use crate::metrics::{CallTimedOut, RecordsWritten, RowsDropped};
use crate::normalize::filter_by_source_id;
use crate::reconcile::{dedup_candidates, reconcile};
use crate::record::CanonicalRecord;

struct Candidates {
    records: Vec<CanonicalRecord>,
    dropped_rows: usize,
}

#[instrument(
    name = "branch",
    skip_all,
    fields(
        resource = %entry.destination_resource_id,
        source = %entry.source_type,
        source_id = %entry.source_id,
    )
)]
pub(super) async fn run(ctx: IngestContext, entry: CatalogEntry) -> Result<BranchSummary, BranchError> {
    let existing = async {
        let ready = ctx
            .lifecycle
            .ensure_ready(&entry.destination_resource_id)
            .await
            .context(ResourceSnafu)?;
        read_existing(&ctx, &ready).await
    };
    let candidates = collect_candidates(&ctx, &entry);

    // Provisioning is never dropped midway: both sides run to completion.
    let (existing, candidates) = tokio::join!(existing, candidates);
    let existing = existing?;
    let candidates = candidates?;

    let records = dedup_candidates(candidates.records, ctx.settings.duplicate_policy);
    let write_set = reconcile(&existing, &records);

    debug!(
        candidates = records.len(),
        existing = existing.len(),
        missing = write_set.len(),
        "Reconciled"
    );

    let resource = &entry.destination_resource_id;
    let written = if write_set.is_empty() {
        info!("Destination already up to date");
        0
    } else {
        let written = bounded(&ctx, "write", ctx.store.write(resource, &write_set))
            .await?
            .context(WriteSnafu {
                resource: resource.as_str(),
                count: write_set.len(),
            })?;

        RecordsWritten {
            count: written as u64,
            resource: resource.to_string(),
        }
        .emit();
        info!(written, missing = write_set.len(), "Records written");
        written
    };

    Ok(BranchSummary {
        written,
        missing: write_set.len(),
        candidates: records.len(),
        existing: existing.len(),
        dropped_rows: candidates.dropped_rows,
    })
}

/// Filter the shared normalized rows down to this entry's source id.
async fn collect_candidates(ctx: &IngestContext, entry: &CatalogEntry) -> Result<Candidates, BranchError> {
    let normalized = ctx.fetch_cache.fetch(&entry.source_type).await?;
    let records = filter_by_source_id(&normalized.records, &entry.source_id);

    let dropped_rows = normalized
        .dropped
        .iter()
        .filter(|e| e.external_id == entry.source_id)
        .count();
    if dropped_rows > 0 {
        RowsDropped {
            count: dropped_rows as u64,
            source_id: entry.source_id.clone(),
        }
        .emit();
    }

    debug!(candidates = records.len(), dropped_rows, "Candidates ready");
    Ok(Candidates {
        records,
        dropped_rows,
    })
}

async fn read_existing(ctx: &IngestContext, ready: &ResourceReady) -> Result<Vec<CanonicalRecord>, BranchError> {
    let resource = ready.resource();
    bounded(ctx, "read_existing", ctx.store.read_all(resource))
        .await?
        .context(ReadExistingSnafu {
            resource: resource.as_str(),
        })
}

async fn bounded<F>(ctx: &IngestContext, operation: &'static str, future: F) -> Result<F::Output, BranchError>
where
    F: Future,
{
    bounded_call(ctx.settings.call_timeout, &ctx.shutdown, future)
        .await
        .map_err(|interrupt| match interrupt {
            CallInterrupt::TimedOut(timeout) => {
                CallTimedOut { operation }.emit();
                BranchError::CallTimeout { operation, timeout }
            }
            CallInterrupt::Cancelled => BranchError::Cancelled,
        })
}
