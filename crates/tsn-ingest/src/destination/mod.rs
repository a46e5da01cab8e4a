//! Destination stores.
//!
//! A store holds one record stream per [`ResourceId`]. Streams must be
//! created and initialized before they are read or written; the lifecycle
//! manager takes care of that ordering.
//!
//! A stream is a set keyed by `(timestamp, source_id)`. Writes never store a
//! second record for a key that is already present.

mod local;
mod memory;

use async_trait::async_trait;

use crate::error::DestinationError;
use crate::lifecycle::ResourceId;
use crate::reconcile::{DuplicatePolicy, dedup_candidates, reconcile};
use crate::record::CanonicalRecord;

pub use local::LocalStore;
pub use memory::{MemoryStore, Operation};

/// A time-series store addressed by resource id.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Whether the resource is provisioned and accepts records.
    ///
    /// A resource left half-provisioned by an earlier run (created but never
    /// initialized) reports `false`, so it goes through create and
    /// initialize again.
    async fn exists(&self, id: &ResourceId) -> Result<bool, DestinationError>;

    /// Create (deploy) the resource. Creating a resource whose container is
    /// already there is not an error.
    async fn create(&self, id: &ResourceId) -> Result<(), DestinationError>;

    /// Initialize a created resource so it accepts records.
    async fn initialize(&self, id: &ResourceId) -> Result<(), DestinationError>;

    /// Every record currently persisted under the resource, in no particular
    /// order.
    async fn read_all(&self, id: &ResourceId) -> Result<Vec<CanonicalRecord>, DestinationError>;

    /// Append the records whose key is not stored yet and return how many
    /// were appended.
    ///
    /// Keys already present, and repeats of a key within `records`, are
    /// skipped, so writing the same batch twice stores it once.
    async fn write(&self, id: &ResourceId, records: &[CanonicalRecord]) -> Result<usize, DestinationError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// The part of `batch` a key-idempotent write appends to `stored`: absent
/// keys only, first occurrence wins.
pub(crate) fn new_keys(stored: &[CanonicalRecord], batch: &[CanonicalRecord]) -> Vec<CanonicalRecord> {
    dedup_candidates(reconcile(stored, batch), DuplicatePolicy::KeepFirst)
}
