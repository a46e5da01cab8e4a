//! Raw source providers.
//!
//! A provider turns a locator (a sheet id, a file path) into raw rows. The
//! [`SourceRegistry`] maps provider tags from the catalog to providers, and
//! the [`FetchCache`] makes sure each `provider:locator` pair is fetched at
//! most once per run.

mod cache;
mod file;
mod gsheet;
mod parse;

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::SourceError;
use crate::record::RawRow;

pub use cache::FetchCache;
pub use file::CsvFileSource;
pub use gsheet::GsheetSource;
pub use parse::parse_rows;

/// A provider of spreadsheet-shaped rows.
#[async_trait]
pub trait RawSource: Send + Sync {
    /// Provider tag this source is registered under.
    fn provider(&self) -> &str;

    /// Fetch every row at `locator`.
    async fn fetch(&self, locator: &str) -> Result<Vec<RawRow>, SourceError>;
}

/// Provider tag to source lookup.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: IndexMap<String, Arc<dyn RawSource>>,
    aliases: IndexMap<String, String>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Google Sheets and local file providers.
    pub fn with_defaults(client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GsheetSource::new(client)));
        registry.alias(gsheet::ALIAS, gsheet::PROVIDER);
        registry.register(Arc::new(CsvFileSource));
        registry
    }

    /// Register `source` under its own provider tag, replacing any previous one.
    pub fn register(&mut self, source: Arc<dyn RawSource>) -> &mut Self {
        self.sources.insert(source.provider().to_string(), source);
        self
    }

    /// Make `alias` resolve to `provider`.
    pub fn alias(&mut self, alias: impl Into<String>, provider: impl Into<String>) -> &mut Self {
        self.aliases.insert(alias.into(), provider.into());
        self
    }

    /// Canonical provider tag for `tag`, if it is registered.
    pub fn resolve(&self, tag: &str) -> Option<&str> {
        let tag = self.aliases.get(tag).map(String::as_str).unwrap_or(tag);
        self.sources.get_key_value(tag).map(|(k, _)| k.as_str())
    }

    /// Source registered for `tag` (aliases included).
    pub fn get(&self, tag: &str) -> Option<Arc<dyn RawSource>> {
        self.resolve(tag)
            .and_then(|canonical| self.sources.get(canonical))
            .cloned()
    }

    pub fn supports(&self, tag: &str) -> bool {
        self.resolve(tag).is_some()
    }

    /// Registered provider tags in registration order.
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("providers", &self.sources.keys().collect::<Vec<_>>())
            .field("aliases", &self.aliases)
            .finish()
    }
}
