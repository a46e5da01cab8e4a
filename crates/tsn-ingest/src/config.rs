//! Configuration for a tsn-ingest run.
//!
//! ```yaml
//! catalog:
//!   repo: acme/primitives
//!   path: catalogs/gsheets.csv
//!   token: ${GITHUB_TOKEN:-}
//! destination:
//!   root: /var/lib/tsn-ingest
//! ingest:
//!   duplicate_policy: forward
//! global:
//!   max_concurrent_branches: 8
//!   call_timeout_secs: 60
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::catalog::{DEFAULT_API_URL, DEFAULT_BRANCH};
use crate::error::ConfigError;
use crate::reconcile::DuplicatePolicy;

pub use tsn_ingest_core::config::{GlobalConfig, LogFormat, MetricsConfig, interpolate};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(version, about = "Ingest spreadsheet time series into a time-series store")]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long, env = "TSN_INGEST_CONFIG")]
    pub config: PathBuf,

    /// Load the configuration and catalog, print the plan and exit
    #[arg(long)]
    pub check: bool,
}

/// GitHub-hosted catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GithubCatalogConfig {
    /// Repository as `owner/name`.
    pub repo: String,
    /// Path of the CSV file inside the repository.
    pub path: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Token for private repositories.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// Where the catalog comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CatalogConfig {
    Github(GithubCatalogConfig),
    File { file: PathBuf },
}

/// Local destination store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    /// Directory holding one subdirectory per stream.
    pub root: PathBuf,
}

/// Reconciliation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub destination: DestinationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        let config: Config =
            serde_yaml::from_str(&result.text).map_err(|source| ConfigError::YamlParse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        match &self.catalog {
            CatalogConfig::Github(github) => {
                if github.repo.trim().is_empty() {
                    errors.push(empty("catalog.repo"));
                } else if !github.repo.contains('/') {
                    errors.push(ConfigError::InvalidValue {
                        field: "catalog.repo".to_string(),
                        message: format!("expected owner/name, got '{}'", github.repo),
                    });
                }
                if github.path.trim().is_empty() {
                    errors.push(empty("catalog.path"));
                }
                if github.branch.trim().is_empty() {
                    errors.push(empty("catalog.branch"));
                }
            }
            CatalogConfig::File { file } => {
                if file.as_os_str().is_empty() {
                    errors.push(empty("catalog.file"));
                }
            }
        }

        if self.destination.root.as_os_str().is_empty() {
            errors.push(empty("destination.root"));
        }

        if let Err(e) = self.global.validate() {
            errors.push(e);
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleErrors {
                errors: errors.iter().map(ToString::to_string).collect(),
            }),
        }
    }
}

fn empty(field: &str) -> ConfigError {
    ConfigError::EmptyField {
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GITHUB: &str = r#"
catalog:
  repo: acme/primitives
  path: catalogs/gsheets.csv
destination:
  root: /tmp/streams
"#;

    #[test]
    fn test_minimal_github_config_uses_defaults() {
        let config = Config::parse(GITHUB).unwrap();
        let CatalogConfig::Github(github) = &config.catalog else {
            panic!("expected github catalog");
        };
        assert_eq!(github.branch, "main");
        assert_eq!(github.api_url, "https://api.github.com");
        assert_eq!(github.token, None);
        assert_eq!(config.ingest.duplicate_policy, DuplicatePolicy::Forward);
        assert_eq!(config.global, GlobalConfig::default());
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.metrics.address.is_none());
    }

    #[test]
    fn test_file_catalog_and_full_sections() {
        let yaml = r#"
catalog:
  file: ./catalog.csv
destination:
  root: ./streams
ingest:
  duplicate_policy: keep_first
global:
  max_concurrent_branches: 4
  call_timeout_secs: 10
metrics:
  address: 127.0.0.1:9090
log_format: json
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(
            config.catalog,
            CatalogConfig::File {
                file: PathBuf::from("./catalog.csv")
            }
        );
        assert_eq!(config.ingest.duplicate_policy, DuplicatePolicy::KeepFirst);
        assert_eq!(config.global.max_concurrent_branches, Some(4));
        assert_eq!(config.global.call_timeout_secs, 10);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_token_from_environment() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("TSN_INGEST_TEST_CATALOG_TOKEN", "ghp_secret") };
        let yaml = GITHUB.replace(
            "  path: catalogs/gsheets.csv\n",
            "  path: catalogs/gsheets.csv\n  token: ${TSN_INGEST_TEST_CATALOG_TOKEN}\n",
        );

        let config = Config::parse(&yaml).unwrap();
        let CatalogConfig::Github(github) = config.catalog else {
            panic!("expected github catalog");
        };
        assert_eq!(github.token.as_deref(), Some("ghp_secret"));
    }

    #[test]
    fn test_missing_variable_is_reported() {
        let yaml = GITHUB.replace("acme/primitives", "${TSN_INGEST_TEST_UNSET_REPO}");
        assert!(matches!(
            Config::parse(&yaml),
            Err(ConfigError::EnvInterpolation { .. })
        ));
    }

    #[test]
    fn test_validation_collects_every_error() {
        let yaml = r#"
catalog:
  repo: ""
  path: ""
destination:
  root: ""
global:
  call_timeout_secs: 0
"#;
        let Err(ConfigError::MultipleErrors { errors }) = Config::parse(yaml) else {
            panic!("expected multiple errors");
        };
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_repo_without_owner_is_invalid() {
        let yaml = GITHUB.replace("acme/primitives", "primitives");
        assert!(matches!(
            Config::parse(&yaml),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let yaml = format!("{GITHUB}surprise: true\n");
        assert!(matches!(Config::parse(&yaml), Err(ConfigError::YamlParse { .. })));
    }
}
