//! Catalog of ingestion work.
//!
//! Each catalog row names where raw rows come from (`source_type`), which
//! destination resource receives them (`stream_id`) and which external id to
//! keep (`source_id`):
//!
//! ```text
//! source_type,stream_id,source_id
//! gsheets:1AbC...,st_cpi_food,1.1.01
//! ```

mod file;
mod github;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, Trim};
use snafu::prelude::*;

use crate::config::CatalogConfig;
use crate::error::{CatalogCsvSnafu, CatalogError, InvalidEntrySnafu, MissingColumnSnafu};
use crate::lifecycle::ResourceId;

pub use file::FileCatalog;
pub use github::{DEFAULT_API_URL, DEFAULT_BRANCH, GithubCatalog};

/// Where a catalog entry's raw rows come from: `<provider>:<locator>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceType {
    pub provider: String,
    pub locator: String,
}

impl SourceType {
    pub fn new(provider: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            locator: locator.into(),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.locator)
    }
}

/// A `source_type` value without a provider prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSourceType {
    pub raw: String,
}

impl fmt::Display for InvalidSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source type {:?} is not of the form <provider>:<locator>", self.raw)
    }
}

impl std::error::Error for InvalidSourceType {}

impl FromStr for SourceType {
    type Err = InvalidSourceType;

    /// Split on the first `:`. Locators may themselves contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidSourceType { raw: s.to_string() };
        let (provider, locator) = s.split_once(':').ok_or_else(invalid)?;
        let (provider, locator) = (provider.trim(), locator.trim());
        if provider.is_empty() || locator.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(provider, locator))
    }
}

/// One unit of ingestion work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub source_type: SourceType,
    pub destination_resource_id: ResourceId,
    pub source_id: String,
}

impl CatalogEntry {
    pub fn new(
        source_type: SourceType,
        destination_resource_id: impl Into<ResourceId>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            source_type,
            destination_resource_id: destination_resource_id.into(),
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <- {} [{}]",
            self.destination_resource_id, self.source_type, self.source_id
        )
    }
}

/// Something that can produce the catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load(&self) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Where the catalog is read from, for logs.
    fn describe(&self) -> String;
}

/// Build the catalog source named by `config`.
pub fn from_config(config: &CatalogConfig, client: reqwest::Client) -> Arc<dyn CatalogSource> {
    match config {
        CatalogConfig::Github(github) => Arc::new(
            GithubCatalog::new(client, &github.repo, &github.path)
                .with_branch(&github.branch)
                .with_token(github.token.clone())
                .with_api_url(&github.api_url),
        ),
        CatalogConfig::File { file } => Arc::new(FileCatalog::new(file)),
    }
}

const SOURCE_TYPE: &[&str] = &["source_type"];
const RESOURCE: &[&str] = &["stream_id", "destination_resource_id"];
const SOURCE_ID: &[&str] = &["source_id"];

fn column(headers: &StringRecord, names: &[&str]) -> Result<usize, CatalogError> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
        .context(MissingColumnSnafu { column: names[0] })
}

/// Parse catalog CSV text.
///
/// Any malformed row fails the whole catalog; a partial catalog would make
/// the run report look healthier than it is.
pub fn parse_catalog(text: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers().context(CatalogCsvSnafu)?.clone();
    let source_type_col = column(&headers, SOURCE_TYPE)?;
    let resource_col = column(&headers, RESOURCE)?;
    let source_id_col = column(&headers, SOURCE_ID)?;

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.context(CatalogCsvSnafu)?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let field = |index: usize, name: &str| -> Result<String, CatalogError> {
            let value = record.get(index).unwrap_or("");
            ensure!(
                !value.is_empty(),
                InvalidEntrySnafu {
                    line,
                    message: format!("empty {name}"),
                }
            );
            Ok(value.to_string())
        };

        let source_type = field(source_type_col, "source_type")?
            .parse::<SourceType>()
            .map_err(|e| CatalogError::InvalidEntry {
                line,
                message: e.to_string(),
            })?;

        entries.push(CatalogEntry {
            source_type,
            destination_resource_id: ResourceId::new(field(resource_col, "stream_id")?),
            source_id: field(source_id_col, "source_id")?,
        });
    }

    Ok(entries)
}
