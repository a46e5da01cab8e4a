//! tsn-ingest: Reconciling ingestion of spreadsheet time series.
//!
//! For every catalog entry this crate:
//! - makes sure the destination stream exists and is initialized
//! - fetches the raw rows and normalizes them into canonical records
//! - keeps the records for the entry's source id
//! - writes only the records whose `(date, source_id)` is not stored yet
//!
//! Entries run as independent branches with bounded concurrency. See
//! [`pipeline`] for the orchestration and [`reconcile`] for the diff.

pub mod app;
pub mod catalog;
pub mod config;
pub mod destination;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod source;

pub use app::Application;
pub use catalog::{CatalogEntry, CatalogSource, SourceType};
pub use config::{CliArgs, Config};
pub use destination::{DestinationStore, LocalStore, MemoryStore};
pub use error::{BranchError, RunError};
pub use lifecycle::{ResourceId, ResourceLifecycleManager, ResourceReady, ResourceState};
pub use pipeline::{BranchOutcome, IngestContext, IngestRunner, IngestSettings, RunReport};
pub use record::{CanonicalRecord, RawRow, RawValue};
pub use source::{RawSource, SourceRegistry};

pub use tsn_ingest_core::{init_tracing, shutdown_signal};
