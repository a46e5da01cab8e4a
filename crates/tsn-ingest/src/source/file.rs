//! Local CSV file provider (`file:<path>`).

use async_trait::async_trait;
use snafu::prelude::*;

use super::{RawSource, parse_rows};
use crate::error::{SourceError, SourceReadSnafu};
use crate::record::RawRow;

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvFileSource;

#[async_trait]
impl RawSource for CsvFileSource {
    fn provider(&self) -> &str {
        "file"
    }

    async fn fetch(&self, locator: &str) -> Result<Vec<RawRow>, SourceError> {
        let text = tokio::fs::read_to_string(locator)
            .await
            .context(SourceReadSnafu { locator })?;
        parse_rows(locator, &text)
    }
}
