use std::path::PathBuf;

use async_trait::async_trait;
use snafu::prelude::*;

use super::{CatalogEntry, CatalogSource, parse_catalog};
use crate::error::{CatalogError, CatalogReadSnafu};

/// Catalog read from a local CSV file.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for FileCatalog {
    async fn load(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .context(CatalogReadSnafu { path: &self.path })?;
        parse_catalog(&text)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.csv");
        std::fs::write(&path, "source_type,stream_id,source_id\ngsheets:A,r,s\n").unwrap();

        let entries = FileCatalog::new(&path).load().await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = FileCatalog::new("/no/such/catalog.csv").load().await.unwrap_err();
        assert!(matches!(err, CatalogError::CatalogRead { .. }));
    }
}
