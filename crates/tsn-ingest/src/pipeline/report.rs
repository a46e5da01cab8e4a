//! Run outcome reporting.

use std::fmt;

use crate::catalog::CatalogEntry;
use crate::error::BranchError;

/// Counts from a branch that finished normally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchSummary {
    /// Records appended to the destination.
    pub written: usize,
    /// Records absent from the destination at read time. Exceeds `written`
    /// when the forwarded batch repeats a key or a concurrent branch stored
    /// the key first.
    pub missing: usize,
    /// Candidates for this source id after normalization and filtering.
    pub candidates: usize,
    /// Records already present in the destination.
    pub existing: usize,
    /// Rows carrying this source id that failed normalization.
    pub dropped_rows: usize,
}

/// How a branch ended.
#[derive(Debug)]
pub enum BranchOutcome {
    Succeeded(BranchSummary),
    Failed(BranchError),
    Cancelled,
}

impl BranchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BranchOutcome::Succeeded(_))
    }
}

/// Outcome of one catalog entry's branch.
#[derive(Debug)]
pub struct BranchReport {
    pub entry: CatalogEntry,
    pub outcome: BranchOutcome,
}

/// A catalog entry that was not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub entry: CatalogEntry,
    pub reason: String,
}

/// Outcome of a whole run, one report per branch in catalog order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub branches: Vec<BranchReport>,
    pub skipped: Vec<SkippedEntry>,
}

impl RunReport {
    /// True when every branch succeeded. Skipped entries do not count.
    pub fn is_success(&self) -> bool {
        self.branches.iter().all(|b| b.outcome.is_success())
    }

    pub fn total_written(&self) -> usize {
        self.summaries().map(|s| s.written).sum()
    }

    pub fn total_dropped_rows(&self) -> usize {
        self.summaries().map(|s| s.dropped_rows).sum()
    }

    /// Branches that failed or were cancelled.
    pub fn failures(&self) -> impl Iterator<Item = &BranchReport> {
        self.branches.iter().filter(|b| !b.outcome.is_success())
    }

    pub fn succeeded(&self) -> usize {
        self.summaries().count()
    }

    /// The report for `resource` and `source_id`, if that branch ran.
    pub fn branch(&self, resource: &str, source_id: &str) -> Option<&BranchReport> {
        self.branches.iter().find(|b| {
            b.entry.destination_resource_id.as_str() == resource && b.entry.source_id == source_id
        })
    }

    fn summaries(&self) -> impl Iterator<Item = &BranchSummary> {
        self.branches.iter().filter_map(|b| match &b.outcome {
            BranchOutcome::Succeeded(summary) => Some(summary),
            _ => None,
        })
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} branches: {} succeeded, {} failed; {} records written; {} skipped",
            self.branches.len(),
            self.succeeded(),
            self.branches.len() - self.succeeded(),
            self.total_written(),
            self.skipped.len(),
        )?;

        for branch in &self.branches {
            match &branch.outcome {
                BranchOutcome::Succeeded(s) => writeln!(
                    f,
                    "  ok        {}: wrote {} of {} candidates ({} existing, {} rows dropped)",
                    branch.entry, s.written, s.candidates, s.existing, s.dropped_rows
                )?,
                BranchOutcome::Failed(e) => writeln!(f, "  failed    {}: {e}", branch.entry)?,
                BranchOutcome::Cancelled => writeln!(f, "  cancelled {}", branch.entry)?,
            }
        }
        for skipped in &self.skipped {
            writeln!(f, "  skipped   {}: {}", skipped.entry, skipped.reason)?;
        }
        Ok(())
    }
}
