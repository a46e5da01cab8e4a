//! Google Sheets provider.
//!
//! Reads the public CSV export of the first sheet, so the spreadsheet must be
//! shared as "anyone with the link can view".

use async_trait::async_trait;
use snafu::prelude::*;
use tracing::debug;

use super::{RawSource, parse_rows};
use crate::error::{SourceError, SourceHttpSnafu, SourceStatusSnafu};
use crate::record::RawRow;

pub(super) const PROVIDER: &str = "gsheets";
pub(super) const ALIAS: &str = "gsheet";

const DEFAULT_BASE_URL: &str = "https://docs.google.com";

pub struct GsheetSource {
    client: reqwest::Client,
    base_url: String,
}

impl GsheetSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the provider at another host serving the same export path.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn export_url(&self, sheet_id: &str) -> String {
        format!(
            "{}/spreadsheets/d/{}/export?format=csv",
            self.base_url, sheet_id
        )
    }
}

#[async_trait]
impl RawSource for GsheetSource {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn fetch(&self, locator: &str) -> Result<Vec<RawRow>, SourceError> {
        let url = self.export_url(locator);
        debug!(%url, "Fetching sheet export");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context(SourceHttpSnafu { locator })?;

        let status = response.status();
        ensure!(
            status.is_success(),
            SourceStatusSnafu {
                locator,
                status: status.as_u16(),
            }
        );

        let body = response.text().await.context(SourceHttpSnafu { locator })?;
        let rows = parse_rows(locator, &body)?;
        debug!(locator, rows = rows.len(), "Fetched sheet");
        Ok(rows)
    }
}
