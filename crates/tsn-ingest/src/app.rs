//! Application lifecycle for the `tsn-ingest` binary.
//!
//! Keeps `main.rs` to a single call: parse arguments, load the config, set up
//! logging and metrics, load the catalog, run it and turn the report into an
//! exit code.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tsn_ingest_core::error::RuntimeSnafu;
use tsn_ingest_core::signal::cancel_on_signal;
use tsn_ingest_core::{init_tracing, start_metrics};

use crate::catalog::{self, CatalogSource};
use crate::config::{CliArgs, Config};
use crate::destination::LocalStore;
use crate::error::{HttpClientSnafu, RunError};
use crate::pipeline::{IngestContext, IngestRunner, IngestSettings, RunReport};
use crate::source::SourceRegistry;

const USER_AGENT: &str = concat!("tsn-ingest/", env!("CARGO_PKG_VERSION"));

/// A loaded configuration plus what to do with it.
pub struct Application {
    config: Config,
    check: bool,
}

impl Application {
    /// Full lifecycle driven by command line arguments.
    pub fn run() -> ExitCode {
        let args = CliArgs::parse();

        let app = match Self::from_args(&args) {
            Ok(app) => app,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                return ExitCode::FAILURE;
            }
        };

        init_tracing(app.config.log_format);
        info!(config = %args.config.display(), "Configuration loaded");
        app.execute()
    }

    pub fn from_args(args: &CliArgs) -> Result<Self, RunError> {
        let config = Config::from_file(&args.config)?;
        Ok(Self::new(config, args.check))
    }

    pub fn new(config: Config, check: bool) -> Self {
        Self { config, check }
    }

    fn execute(self) -> ExitCode {
        let runtime = match tokio::runtime::Runtime::new().context(RuntimeSnafu) {
            Ok(runtime) => runtime,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        };

        let shutdown = CancellationToken::new();
        let result = runtime.block_on(async {
            cancel_on_signal(shutdown.clone());
            if self.check {
                self.check_catalog().await.map(|()| true)
            } else {
                self.ingest(shutdown.clone())
                    .await
                    .map(|report| {
                        print!("{report}");
                        report.is_success()
                    })
            }
        });
        shutdown.cancel();

        match result {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => {
                error!("Ingestion finished with failures");
                ExitCode::FAILURE
            }
            Err(e) => {
                error!(error = %e, "Ingestion aborted");
                eprintln!("Ingestion aborted: {e}");
                ExitCode::FAILURE
            }
        }
    }

    /// Load the catalog and run every supported entry.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn ingest(&self, shutdown: CancellationToken) -> Result<RunReport, RunError> {
        if let Some(addr) = start_metrics(&self.config.metrics, shutdown.clone()).await? {
            info!(%addr, "Serving metrics");
        }

        let client = http_client(self.config.global.call_timeout())?;
        let entries = load_catalog(&*catalog::from_config(&self.config.catalog, client.clone())).await?;

        let store = Arc::new(LocalStore::new(&self.config.destination.root));
        info!(destination = %store.root().display(), "Using local destination store");

        let registry = Arc::new(SourceRegistry::with_defaults(client));
        let ctx = IngestContext::new(
            store,
            registry,
            IngestSettings::from_config(&self.config),
            shutdown,
        );
        Ok(IngestRunner::new(ctx).run(entries).await)
    }

    async fn check_catalog(&self) -> Result<(), RunError> {
        let client = http_client(self.config.global.call_timeout())?;
        let entries = load_catalog(&*catalog::from_config(&self.config.catalog, client.clone())).await?;

        let ctx = IngestContext::new(
            Arc::new(LocalStore::new(&self.config.destination.root)),
            Arc::new(SourceRegistry::with_defaults(client)),
            IngestSettings::from_config(&self.config),
            CancellationToken::new(),
        );
        let (runnable, skipped) = IngestRunner::new(ctx).plan(entries);

        println!("{} branches, {} skipped", runnable.len(), skipped.len());
        for entry in &runnable {
            println!("  run     {entry}");
        }
        for skipped in &skipped {
            println!("  skip    {}: {}", skipped.entry, skipped.reason);
        }
        Ok(())
    }
}

async fn load_catalog(source: &dyn CatalogSource) -> Result<Vec<catalog::CatalogEntry>, RunError> {
    info!(catalog = %source.describe(), "Loading catalog");
    let entries = source.load().await?;
    info!(entries = entries.len(), "Catalog loaded");
    Ok(entries)
}

/// Shared client for the catalog and every HTTP source.
fn http_client(call_timeout: Duration) -> Result<reqwest::Client, RunError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(call_timeout)
        .build()
        .context(HttpClientSnafu)
}
