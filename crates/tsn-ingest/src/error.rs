//! Error types for the ingestion pipeline.
//!
//! The variants mirror how far a failure reaches:
//! - [`RowError`] stays inside the normalizer (row dropped, branch continues)
//! - [`ResourceError`], [`SourceError`] and [`DestinationError`] end one branch
//! - [`BranchError`] is what a branch reports to the runner
//! - [`CatalogError`] and [`RunError`] stop the run before any branch starts

use std::sync::Arc;
use std::time::Duration;

use snafu::prelude::*;

pub use tsn_ingest_core::error::{ConfigError, SetupError};

use crate::lifecycle::ProvisionStage;

// ============ Row Errors ============

/// Why a raw row could not be normalized.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum RowErrorKind {
    #[snafu(display("invalid year {raw:?}"))]
    InvalidYear { raw: String },

    #[snafu(display("invalid month {raw:?}"))]
    InvalidMonth { raw: String },

    #[snafu(display("invalid day {raw:?}"))]
    InvalidDay { raw: String },

    #[snafu(display("{year:04}-{month:02}-{day:02} is not a calendar date"))]
    InvalidDate { year: i32, month: u32, day: u32 },

    #[snafu(display("value {raw:?} is not a number"))]
    InvalidValue { raw: String },

    #[snafu(display("value {value} is not finite"))]
    NonFiniteValue { value: f64 },
}

/// A single raw row that was dropped during normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    /// Zero-based index of the row in the fetched sequence.
    pub row: usize,
    pub external_id: String,
    pub kind: RowErrorKind,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {} ({}): {}", self.row, self.external_id, self.kind)
    }
}

impl std::error::Error for RowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

// ============ Catalog Errors ============

/// Errors loading or parsing the catalog. Any of these aborts the run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CatalogError {
    /// HTTP request for the catalog failed.
    #[snafu(display("Failed to fetch catalog {location}: {source}"))]
    CatalogFetch {
        location: String,
        source: reqwest::Error,
    },

    /// Repository or file does not exist (or is not visible with this token).
    #[snafu(display("Catalog {location} not found (404). {hint}"))]
    CatalogNotFound { location: String, hint: String },

    /// The configured token cannot be sent as a header.
    #[snafu(display("Catalog token is not a valid header value: {source}"))]
    InvalidToken {
        source: reqwest::header::InvalidHeaderValue,
    },

    /// The configured API base cannot hold a contents path.
    #[snafu(display("Invalid GitHub API URL '{api_url}': {message}"))]
    InvalidApiUrl { api_url: String, message: String },

    /// Unexpected HTTP status.
    #[snafu(display("Catalog {location} returned HTTP {status}"))]
    CatalogStatus { location: String, status: u16 },

    /// Failed to read a local catalog file.
    #[snafu(display("Failed to read catalog file {}: {source}", path.display()))]
    CatalogRead {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// The catalog is not valid CSV.
    #[snafu(display("Malformed catalog CSV: {source}"))]
    CatalogCsv { source: csv::Error },

    /// A required column is absent from the header.
    #[snafu(display("Catalog is missing required column '{column}'"))]
    MissingColumn { column: String },

    /// A row has an empty or unparseable field.
    #[snafu(display("Catalog line {line}: {message}"))]
    InvalidEntry { line: u64, message: String },
}

// ============ Source Errors ============

/// Errors fetching raw rows from a source provider.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// HTTP request failed.
    #[snafu(display("Request for {locator} failed: {source}"))]
    SourceHttp {
        locator: String,
        source: reqwest::Error,
    },

    /// Unexpected HTTP status.
    #[snafu(display("Source {locator} returned HTTP {status}"))]
    SourceStatus { locator: String, status: u16 },

    /// Failed to read a local source file.
    #[snafu(display("Failed to read source file {locator}: {source}"))]
    SourceRead {
        locator: String,
        source: std::io::Error,
    },

    /// Payload is not valid CSV.
    #[snafu(display("Malformed CSV in {locator}: {source}"))]
    SourceCsv { locator: String, source: csv::Error },

    /// No provider is registered under this tag.
    #[snafu(display("No source provider registered for '{provider}'"))]
    UnknownProvider { provider: String },

    /// Payload lacks a column every row needs.
    #[snafu(display("Source {locator} is missing required column '{column}'"))]
    SourceColumn { locator: String, column: String },
}

// ============ Destination Errors ============

/// Errors reported by a destination store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DestinationError {
    /// Filesystem operation failed.
    #[snafu(display("I/O error on resource {resource}: {source}"))]
    DestinationIo {
        resource: String,
        source: std::io::Error,
    },

    /// A stored record could not be encoded or decoded.
    #[snafu(display("Bad record in resource {resource} at line {line}: {source}"))]
    DestinationCodec {
        resource: String,
        line: usize,
        source: serde_json::Error,
    },

    /// Resource was read or written before it was created and initialized.
    #[snafu(display("Resource {resource} is not initialized"))]
    NotInitialized { resource: String },

    /// The store refused the operation.
    #[snafu(display("Resource {resource} rejected {operation}: {message}"))]
    Rejected {
        resource: String,
        operation: String,
        message: String,
    },
}

// ============ Resource Errors ============

/// Errors while bringing a destination resource to the ready state.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ResourceError {
    /// The existence check failed.
    #[snafu(display("Existence check for {resource} failed: {source}"))]
    ExistsCheck {
        resource: String,
        source: DestinationError,
    },

    /// The create call failed.
    #[snafu(display("Deploying {resource} failed: {source}"))]
    Deploy {
        resource: String,
        source: DestinationError,
    },

    /// The initialize call failed.
    #[snafu(display("Initializing {resource} failed: {source}"))]
    Initialize {
        resource: String,
        source: DestinationError,
    },

    /// An earlier attempt in this run failed; no retry is made.
    #[snafu(display("{resource} failed earlier in this run during {stage}: {message}"))]
    PreviouslyFailed {
        resource: String,
        stage: ProvisionStage,
        message: String,
    },

    /// A provisioning call exceeded the per-call timeout.
    #[snafu(display("{stage} of {resource} timed out after {timeout:?}"))]
    ProvisionTimeout {
        resource: String,
        stage: ProvisionStage,
        timeout: Duration,
    },

    /// The run was cancelled while provisioning.
    #[snafu(display("Provisioning of {resource} cancelled"))]
    ProvisionCancelled { resource: String },
}

impl ResourceError {
    /// Check if this error was caused by run cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResourceError::ProvisionCancelled { .. })
    }
}

// ============ Branch Errors ============

/// Why one catalog entry's branch failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BranchError {
    /// Destination resource could not be made ready.
    #[snafu(display("Resource error: {source}"))]
    Resource { source: ResourceError },

    /// Raw rows could not be fetched.
    #[snafu(display("Fetch from {provider}:{locator} failed: {source}"))]
    Fetch {
        provider: String,
        locator: String,
        source: Arc<SourceError>,
    },

    /// Existing records could not be read.
    #[snafu(display("Reading existing records of {resource} failed: {source}"))]
    ReadExisting {
        resource: String,
        source: DestinationError,
    },

    /// The write call failed.
    #[snafu(display("Writing {count} records to {resource} failed: {source}"))]
    Write {
        resource: String,
        count: usize,
        source: DestinationError,
    },

    /// A network call exceeded the per-call timeout.
    #[snafu(display("{operation} timed out after {timeout:?}"))]
    CallTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The run was cancelled.
    #[snafu(display("Branch cancelled"))]
    Cancelled,

    /// The branch task panicked.
    #[snafu(display("Branch panicked: {message}"))]
    Panicked { message: String },
}

impl BranchError {
    /// Check if this error was caused by run cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            BranchError::Cancelled => true,
            BranchError::Resource { source } => source.is_cancelled(),
            _ => false,
        }
    }
}

// ============ Run Errors ============

/// Errors that stop the whole run before any branch starts.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RunError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Catalog could not be loaded.
    #[snafu(display("Catalog error: {source}"))]
    Catalog { source: CatalogError },

    /// Runtime or metrics setup failed.
    #[snafu(display("Setup error: {source}"))]
    Setup { source: SetupError },

    /// The HTTP client could not be built.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    HttpClient { source: reqwest::Error },
}

impl From<ConfigError> for RunError {
    fn from(source: ConfigError) -> Self {
        RunError::Config { source }
    }
}

impl From<CatalogError> for RunError {
    fn from(source: CatalogError) -> Self {
        RunError::Catalog { source }
    }
}

impl From<SetupError> for RunError {
    fn from(source: SetupError) -> Self {
        RunError::Setup { source }
    }
}
