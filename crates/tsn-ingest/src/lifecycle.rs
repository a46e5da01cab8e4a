//! Destination resource lifecycle.
//!
//! A resource moves `Unknown -> Ready` when it already exists, or
//! `Unknown -> Deploying -> Initializing -> Ready` when it has to be
//! provisioned. Any failure moves it to `Failed` for the rest of the run.
//!
//! The state for each id lives behind its own async mutex which is held for
//! the whole transition. Callers for the same id serialize; callers for
//! different ids never wait on each other.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsn_ingest_core::{CallInterrupt, InternalEvent, bounded_call};

use crate::destination::DestinationStore;
use crate::error::{
    DeploySnafu, ExistsCheckSnafu, InitializeSnafu, PreviouslyFailedSnafu, ResourceError,
};
use crate::metrics::{CallTimedOut, ResourceProvisioned};

/// Identifier of a destination resource (a stream).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Step of the provisioning sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    ExistsCheck,
    Deploy,
    Initialize,
}

impl ProvisionStage {
    /// Label used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStage::ExistsCheck => "exists",
            ProvisionStage::Deploy => "deploy",
            ProvisionStage::Initialize => "initialize",
        }
    }
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStage::ExistsCheck => f.write_str("existence check"),
            ProvisionStage::Deploy => f.write_str("deploy"),
            ProvisionStage::Initialize => f.write_str("initialize"),
        }
    }
}

/// Where a resource is in its lifecycle during this run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResourceState {
    #[default]
    Unknown,
    Deploying,
    Initializing,
    Ready,
    Failed {
        stage: ProvisionStage,
        message: String,
    },
}

impl ResourceState {
    /// Stage a failure in this state belongs to.
    fn stage(&self) -> ProvisionStage {
        match self {
            ResourceState::Deploying => ProvisionStage::Deploy,
            ResourceState::Initializing => ProvisionStage::Initialize,
            ResourceState::Failed { stage, .. } => *stage,
            ResourceState::Unknown | ResourceState::Ready => ProvisionStage::ExistsCheck,
        }
    }
}

/// Proof that a resource reached `Ready`.
///
/// Only [`ResourceLifecycleManager::ensure_ready`] hands these out, so any
/// code holding one knows the resource can be read and written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReady {
    resource: ResourceId,
}

impl ResourceReady {
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }
}

type Slot = Arc<Mutex<ResourceState>>;

/// Brings destination resources to `Ready` at most once per run.
pub struct ResourceLifecycleManager {
    store: Arc<dyn DestinationStore>,
    call_timeout: Duration,
    shutdown: CancellationToken,
    slots: Mutex<HashMap<ResourceId, Slot>>,
}

impl ResourceLifecycleManager {
    pub fn new(
        store: Arc<dyn DestinationStore>,
        call_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            call_timeout,
            shutdown,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Ensure `id` exists and is initialized.
    ///
    /// The first caller for an id does the work; later callers see the
    /// cached outcome. A resource that failed earlier in the run is not
    /// retried.
    pub async fn ensure_ready(&self, id: &ResourceId) -> Result<ResourceReady, ResourceError> {
        let slot = self.slot(id).await;

        let mut state = match self.shutdown.run_until_cancelled(slot.lock()).await {
            Some(guard) => guard,
            None => {
                return Err(ResourceError::ProvisionCancelled {
                    resource: id.to_string(),
                });
            }
        };

        match state.clone() {
            ResourceState::Ready => {
                debug!(resource = %id, "Resource already ready");
                return Ok(ResourceReady {
                    resource: id.clone(),
                });
            }
            ResourceState::Failed { stage, message } => {
                return PreviouslyFailedSnafu {
                    resource: id.as_str(),
                    stage,
                    message,
                }
                .fail();
            }
            // A previous caller was dropped mid-transition. The resource may
            // be created but not initialized, so it cannot be trusted.
            ResourceState::Deploying | ResourceState::Initializing => {
                let stage = state.stage();
                *state = ResourceState::Failed {
                    stage,
                    message: "provisioning was interrupted".to_string(),
                };
                return Err(ResourceError::PreviouslyFailed {
                    resource: id.to_string(),
                    stage,
                    message: "provisioning was interrupted".to_string(),
                });
            }
            ResourceState::Unknown => {}
        }

        match self.provision(id, &mut state).await {
            Ok(()) => {
                *state = ResourceState::Ready;
                Ok(ResourceReady {
                    resource: id.clone(),
                })
            }
            Err(e) if e.is_cancelled() => {
                *state = ResourceState::Unknown;
                Err(e)
            }
            Err(e) => {
                let stage = state.stage();
                warn!(resource = %id, %stage, error = %e, "Resource provisioning failed");
                *state = ResourceState::Failed {
                    stage,
                    message: e.to_string(),
                };
                Err(e)
            }
        }
    }

    /// Current state of `id`. Waits for an in-flight transition to finish.
    pub async fn state(&self, id: &ResourceId) -> ResourceState {
        let slot = self.slots.lock().await.get(id).cloned();
        match slot {
            Some(slot) => slot.lock().await.clone(),
            None => ResourceState::Unknown,
        }
    }

    async fn slot(&self, id: &ResourceId) -> Slot {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(id.clone()).or_default())
    }

    async fn provision(&self, id: &ResourceId, state: &mut ResourceState) -> Result<(), ResourceError> {
        let exists = self
            .bounded(id, ProvisionStage::ExistsCheck, self.store.exists(id))
            .await?
            .context(ExistsCheckSnafu {
                resource: id.as_str(),
            })?;

        if exists {
            info!(resource = %id, "Resource exists");
            return Ok(());
        }

        *state = ResourceState::Deploying;
        info!(resource = %id, "Deploying resource");
        self.bounded(id, ProvisionStage::Deploy, self.store.create(id))
            .await?
            .context(DeploySnafu {
                resource: id.as_str(),
            })?;

        *state = ResourceState::Initializing;
        info!(resource = %id, "Initializing resource");
        self.bounded(id, ProvisionStage::Initialize, self.store.initialize(id))
            .await?
            .context(InitializeSnafu {
                resource: id.as_str(),
            })?;

        ResourceProvisioned {
            resource: id.to_string(),
        }
        .emit();
        info!(resource = %id, "Resource provisioned");
        Ok(())
    }

    async fn bounded<F>(
        &self,
        id: &ResourceId,
        stage: ProvisionStage,
        future: F,
    ) -> Result<F::Output, ResourceError>
    where
        F: Future,
    {
        bounded_call(self.call_timeout, &self.shutdown, future)
            .await
            .map_err(|interrupt| match interrupt {
                CallInterrupt::TimedOut(timeout) => {
                    CallTimedOut {
                        operation: stage.as_str(),
                    }
                    .emit();
                    ResourceError::ProvisionTimeout {
                        resource: id.to_string(),
                        stage,
                        timeout,
                    }
                }
                CallInterrupt::Cancelled => ResourceError::ProvisionCancelled {
                    resource: id.to_string(),
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::{MemoryStore, Operation};

    fn manager(store: &Arc<MemoryStore>) -> ResourceLifecycleManager {
        ResourceLifecycleManager::new(
            store.clone(),
            Duration::from_secs(5),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_missing_resource_is_deployed_then_initialized() {
        let store = Arc::new(MemoryStore::new());
        let lifecycle = manager(&store);
        let id = ResourceId::from("res1");

        let ready = lifecycle.ensure_ready(&id).await.unwrap();
        assert_eq!(ready.resource(), &id);
        assert_eq!(store.calls(Operation::Create), 1);
        assert_eq!(store.calls(Operation::Initialize), 1);
        assert_eq!(lifecycle.state(&id).await, ResourceState::Ready);
    }

    #[tokio::test]
    async fn test_existing_resource_is_not_redeployed() {
        let store = Arc::new(MemoryStore::new().with_resource("res1", vec![]));
        let lifecycle = manager(&store);

        lifecycle.ensure_ready(&"res1".into()).await.unwrap();
        assert_eq!(store.calls(Operation::Exists), 1);
        assert_eq!(store.calls(Operation::Create), 0);
        assert_eq!(store.calls(Operation::Initialize), 0);
    }

    #[tokio::test]
    async fn test_second_call_issues_no_destination_calls() {
        let store = Arc::new(MemoryStore::new());
        let lifecycle = manager(&store);
        let id = ResourceId::from("res1");

        lifecycle.ensure_ready(&id).await.unwrap();
        let before = store.total_calls();
        lifecycle.ensure_ready(&id).await.unwrap();
        assert_eq!(store.total_calls(), before);
    }

    #[tokio::test]
    async fn test_concurrent_callers_provision_once() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(20)));
        let lifecycle = Arc::new(manager(&store));
        let id = ResourceId::from("shared");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lifecycle = lifecycle.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move { lifecycle.ensure_ready(&id).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(store.calls(Operation::Exists), 1);
        assert_eq!(store.calls(Operation::Create), 1);
        assert_eq!(store.calls(Operation::Initialize), 1);
    }

    #[tokio::test]
    async fn test_initialize_failure_is_not_retried() {
        let store = Arc::new(MemoryStore::new());
        store.fail_on(Operation::Initialize, "res1", "boom");
        let lifecycle = manager(&store);
        let id = ResourceId::from("res1");

        let err = lifecycle.ensure_ready(&id).await.unwrap_err();
        assert!(matches!(err, ResourceError::Initialize { .. }));
        assert!(matches!(
            lifecycle.state(&id).await,
            ResourceState::Failed {
                stage: ProvisionStage::Initialize,
                ..
            }
        ));

        // No second attempt within the run, even though create succeeded.
        let err = lifecycle.ensure_ready(&id).await.unwrap_err();
        assert!(matches!(
            err,
            ResourceError::PreviouslyFailed {
                stage: ProvisionStage::Initialize,
                ..
            }
        ));
        assert_eq!(store.calls(Operation::Exists), 1);
        assert_eq!(store.calls(Operation::Initialize), 1);
    }

    #[tokio::test]
    async fn test_half_provisioned_resource_is_provisioned_again() {
        let store = Arc::new(MemoryStore::new());
        let id = ResourceId::from("res1");
        store.create(&id).await.unwrap();

        manager(&store).ensure_ready(&id).await.unwrap();
        assert!(store.is_initialized(&id));
        assert_eq!(store.calls_for(Operation::Create, &id), 2);
        assert_eq!(store.calls_for(Operation::Initialize, &id), 1);
    }

    #[tokio::test]
    async fn test_hung_create_times_out() {
        let store = Arc::new(MemoryStore::new());
        store.hang_on(Operation::Create, "res1");
        let lifecycle = ResourceLifecycleManager::new(
            store.clone(),
            Duration::from_millis(20),
            CancellationToken::new(),
        );

        let err = lifecycle.ensure_ready(&"res1".into()).await.unwrap_err();
        assert!(matches!(
            err,
            ResourceError::ProvisionTimeout {
                stage: ProvisionStage::Deploy,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dropped_transition_is_not_trusted() {
        let store = Arc::new(MemoryStore::new());
        store.hang_on(Operation::Initialize, "res1");
        let lifecycle = manager(&store);
        let id = ResourceId::from("res1");

        let dropped = tokio::time::timeout(Duration::from_millis(20), lifecycle.ensure_ready(&id)).await;
        assert!(dropped.is_err());

        let err = lifecycle.ensure_ready(&id).await.unwrap_err();
        assert!(matches!(
            err,
            ResourceError::PreviouslyFailed {
                stage: ProvisionStage::Initialize,
                ..
            }
        ));
        assert_eq!(store.calls(Operation::Exists), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let store = Arc::new(MemoryStore::new());
        let token = CancellationToken::new();
        token.cancel();
        let lifecycle = ResourceLifecycleManager::new(store.clone(), Duration::from_secs(1), token);

        let err = lifecycle.ensure_ready(&"res1".into()).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_distinct_ids_are_independent() {
        let store = Arc::new(MemoryStore::new());
        store.fail_on(Operation::Create, "bad", "quota");
        let lifecycle = manager(&store);

        assert!(lifecycle.ensure_ready(&"bad".into()).await.is_err());
        assert!(lifecycle.ensure_ready(&"good".into()).await.is_ok());
        assert_eq!(lifecycle.state(&"unseen".into()).await, ResourceState::Unknown);
    }
}
