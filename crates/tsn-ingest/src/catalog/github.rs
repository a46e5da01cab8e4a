//! Catalog stored in a GitHub repository.
//!
//! Uses the contents API with the raw media type, so the response body is the
//! CSV file itself rather than base64 wrapped in JSON.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use snafu::prelude::*;
use tracing::{debug, instrument};

use super::{CatalogEntry, CatalogSource, parse_catalog};
use crate::error::{CatalogError, CatalogFetchSnafu, CatalogStatusSnafu, InvalidTokenSnafu};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";

const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

#[derive(Debug, Clone)]
pub struct GithubCatalog {
    client: reqwest::Client,
    api_url: String,
    repo: String,
    path: String,
    branch: String,
    token: Option<String>,
}

impl GithubCatalog {
    /// `repo` is `owner/name`; `path` is relative to the repository root.
    pub fn new(client: reqwest::Client, repo: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            repo: repo.into(),
            path: path.into(),
            branch: DEFAULT_BRANCH.to_string(),
            token: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Contents API URL for the catalog file, with each path segment and the
    /// branch percent-encoded.
    pub fn contents_url(&self) -> Result<Url, CatalogError> {
        let invalid = |message: String| CatalogError::InvalidApiUrl {
            api_url: self.api_url.clone(),
            message,
        };

        let mut url = Url::parse(&self.api_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("not a base URL".to_string()))?
            .pop_if_empty()
            .push("repos")
            .extend(self.repo.split('/'))
            .push("contents")
            .extend(self.path.split('/').filter(|s| !s.is_empty()));
        url.query_pairs_mut().append_pair("ref", &self.branch);
        Ok(url)
    }

    fn headers(&self) -> Result<HeaderMap, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("tsn-ingest"));
        headers.insert(ACCEPT, HeaderValue::from_static(RAW_MEDIA_TYPE));
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).context(InvalidTokenSnafu)?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn not_found_hint(&self) -> &'static str {
        if self.token.is_some() {
            "Check that the path and branch exist and that the token can read this repository."
        } else {
            "Private repositories need a token; set catalog.token."
        }
    }
}

#[async_trait]
impl CatalogSource for GithubCatalog {
    #[instrument(skip(self), fields(repo = %self.repo, path = %self.path))]
    async fn load(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let location = self.describe();
        let response = self
            .client
            .get(self.contents_url()?)
            .headers(self.headers()?)
            .send()
            .await
            .context(CatalogFetchSnafu {
                location: location.as_str(),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::CatalogNotFound {
                location,
                hint: self.not_found_hint().to_string(),
            });
        }
        ensure!(
            status.is_success(),
            CatalogStatusSnafu {
                location: location.as_str(),
                status: status.as_u16(),
            }
        );

        let body = response.text().await.context(CatalogFetchSnafu {
            location: location.as_str(),
        })?;
        let entries = parse_catalog(&body)?;
        debug!(entries = entries.len(), "Catalog loaded");
        Ok(entries)
    }

    fn describe(&self) -> String {
        format!("github:{}/{}@{}", self.repo, self.path, self.branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> GithubCatalog {
        GithubCatalog::new(reqwest::Client::new(), "acme/data", "/catalogs/primitives.csv")
    }

    #[test]
    fn test_contents_url() {
        assert_eq!(
            catalog().contents_url().unwrap().as_str(),
            "https://api.github.com/repos/acme/data/contents/catalogs/primitives.csv?ref=main"
        );
        assert_eq!(
            catalog()
                .with_branch("dev")
                .with_api_url("http://localhost:9000/")
                .contents_url()
                .unwrap()
                .as_str(),
            "http://localhost:9000/repos/acme/data/contents/catalogs/primitives.csv?ref=dev"
        );
        assert_eq!(
            catalog()
                .with_api_url("https://ghe.example.com/api/v3")
                .contents_url()
                .unwrap()
                .as_str(),
            "https://ghe.example.com/api/v3/repos/acme/data/contents/catalogs/primitives.csv?ref=main"
        );
    }

    #[test]
    fn test_contents_url_encodes_path_and_branch() {
        let url = GithubCatalog::new(reqwest::Client::new(), "acme/data", "data sets/prims#1?.csv")
            .with_branch("feature/x&y")
            .contents_url()
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/data/contents/data%20sets/prims%231%3F.csv?ref=feature%2Fx%26y"
        );
        assert_eq!(url.query_pairs().next().unwrap().1, "feature/x&y");
    }

    #[test]
    fn test_invalid_api_url_is_an_error() {
        let err = catalog().with_api_url("not a url").contents_url().unwrap_err();
        assert!(matches!(err, CatalogError::InvalidApiUrl { .. }));
    }

    #[test]
    fn test_headers_carry_token() {
        let headers = catalog().with_token(Some("abc".into())).headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer abc");
        assert_eq!(headers[ACCEPT], RAW_MEDIA_TYPE);

        let anonymous = catalog().with_token(Some(String::new())).headers().unwrap();
        assert!(!anonymous.contains_key(AUTHORIZATION));
    }

    #[test]
    fn test_bad_token_is_an_error() {
        let err = catalog().with_token(Some("a\nb".into())).headers().unwrap_err();
        assert!(matches!(err, CatalogError::InvalidToken { .. }));
    }

    #[test]
    fn test_not_found_hint_mentions_token() {
        assert!(catalog().not_found_hint().contains("token"));
        assert!(catalog().with_token(Some("t".into())).not_found_hint().contains("token"));
    }
}
