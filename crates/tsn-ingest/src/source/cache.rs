//! Per-run fetch cache.
//!
//! Several catalog entries usually point at the same sheet with different
//! source ids. The cache keeps one slot per `provider:locator`; the first
//! branch to reach it fetches and normalizes, the others wait for and share
//! the outcome, failures included. Dropped rows are therefore reported once
//! per sheet, whether or not a catalog entry asks for their source id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsn_ingest_core::{CallInterrupt, InternalEvent, bounded_call};

use super::SourceRegistry;
use crate::catalog::SourceType;
use crate::error::{BranchError, SourceError};
use crate::metrics::CallTimedOut;
use crate::normalize::{Normalized, normalize};

const FETCH_OPERATION: &str = "fetch";

#[derive(Debug, Clone)]
enum Fetched {
    Rows(Arc<Normalized>),
    Failed(Arc<SourceError>),
    TimedOut(Duration),
}

type Slot = Arc<OnceCell<Fetched>>;

/// Shares normalized rows between branches of one run.
pub struct FetchCache {
    registry: Arc<SourceRegistry>,
    call_timeout: Duration,
    shutdown: CancellationToken,
    slots: Mutex<HashMap<(String, String), Slot>>,
}

impl FetchCache {
    pub fn new(registry: Arc<SourceRegistry>, call_timeout: Duration, shutdown: CancellationToken) -> Self {
        Self {
            registry,
            call_timeout,
            shutdown,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Normalized rows at `source`, fetched at most once per run.
    ///
    /// Cancellation is not cached: a fetch interrupted by shutdown leaves the
    /// slot empty.
    pub async fn fetch(&self, source: &SourceType) -> Result<Arc<Normalized>, BranchError> {
        let Some(provider) = self.registry.get(&source.provider) else {
            return Err(BranchError::Fetch {
                provider: source.provider.clone(),
                locator: source.locator.clone(),
                source: Arc::new(SourceError::UnknownProvider {
                    provider: source.provider.clone(),
                }),
            });
        };

        let key = (provider.provider().to_string(), source.locator.clone());
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key).or_default())
        };

        let fetched = slot
            .get_or_try_init(|| async {
                info!(provider = provider.provider(), locator = %source.locator, "Fetching source");
                match bounded_call(self.call_timeout, &self.shutdown, provider.fetch(&source.locator)).await {
                    Ok(Ok(rows)) => {
                        let normalized = normalize(&rows);
                        debug!(
                            locator = %source.locator,
                            rows = rows.len(),
                            records = normalized.records.len(),
                            "Source fetched"
                        );
                        if !normalized.dropped.is_empty() {
                            warn!(
                                locator = %source.locator,
                                dropped = normalized.dropped.len(),
                                "Rows dropped during normalization"
                            );
                        }
                        Ok(Fetched::Rows(Arc::new(normalized)))
                    }
                    Ok(Err(e)) => Ok(Fetched::Failed(Arc::new(e))),
                    Err(CallInterrupt::TimedOut(timeout)) => {
                        CallTimedOut {
                            operation: FETCH_OPERATION,
                        }
                        .emit();
                        Ok(Fetched::TimedOut(timeout))
                    }
                    Err(CallInterrupt::Cancelled) => Err(BranchError::Cancelled),
                }
            })
            .await?;

        match fetched {
            Fetched::Rows(rows) => Ok(Arc::clone(rows)),
            Fetched::Failed(e) => Err(BranchError::Fetch {
                provider: source.provider.clone(),
                locator: source.locator.clone(),
                source: Arc::clone(e),
            }),
            Fetched::TimedOut(timeout) => Err(BranchError::CallTimeout {
                operation: FETCH_OPERATION,
                timeout: *timeout,
            }),
        }
    }
}
