//! Internal events for ingestion metrics.
//!
//! Each struct is one measurable occurrence in a run. Emitting it records the
//! matching counter; without an installed recorder that is a no-op.

use metrics::counter;
use tracing::trace;
use tsn_ingest_core::InternalEvent;

/// Records appended to a destination resource.
pub struct RecordsWritten {
    pub count: u64,
    pub resource: String,
}

impl InternalEvent for RecordsWritten {
    fn emit(self) {
        trace!(count = self.count, resource = %self.resource, "Records written");
        counter!("tsn_ingest_records_written_total", "resource" => self.resource).increment(self.count);
    }
}

/// Raw rows dropped by the normalizer.
pub struct RowsDropped {
    pub count: u64,
    pub source_id: String,
}

impl InternalEvent for RowsDropped {
    fn emit(self) {
        trace!(count = self.count, source_id = %self.source_id, "Rows dropped");
        counter!("tsn_ingest_rows_dropped_total", "source_id" => self.source_id).increment(self.count);
    }
}

/// Final status of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl BranchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchStatus::Succeeded => "succeeded",
            BranchStatus::Failed => "failed",
            BranchStatus::Cancelled => "cancelled",
        }
    }
}

/// A branch reached its final state.
pub struct BranchFinished {
    pub status: BranchStatus,
}

impl InternalEvent for BranchFinished {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Branch finished");
        counter!("tsn_ingest_branches_total", "status" => self.status.as_str()).increment(1);
    }
}

/// A destination resource was created and initialized in this run.
pub struct ResourceProvisioned {
    pub resource: String,
}

impl InternalEvent for ResourceProvisioned {
    fn emit(self) {
        trace!(resource = %self.resource, "Resource provisioned");
        counter!("tsn_ingest_resources_provisioned_total").increment(1);
    }
}

/// A bounded call hit its timeout.
pub struct CallTimedOut {
    pub operation: &'static str,
}

impl InternalEvent for CallTimedOut {
    fn emit(self) {
        trace!(operation = self.operation, "Call timed out");
        counter!("tsn_ingest_call_timeouts_total", "op" => self.operation).increment(1);
    }
}
