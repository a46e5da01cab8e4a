//! In-process destination store.
//!
//! Keeps streams in a map and counts every call, which makes it the store
//! of choice for tests. Failures and hangs can be injected per operation and
//! resource.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{DestinationStore, new_keys};
use crate::error::DestinationError;
use crate::lifecycle::ResourceId;
use crate::record::CanonicalRecord;

/// A store operation, used to count calls and target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Exists,
    Create,
    Initialize,
    ReadAll,
    Write,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Exists => "exists",
            Operation::Create => "create",
            Operation::Initialize => "initialize",
            Operation::ReadAll => "read_all",
            Operation::Write => "write",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
enum Fault {
    Fail(String),
    Hang,
}

#[derive(Debug, Default)]
struct Stream {
    initialized: bool,
    records: Vec<CanonicalRecord>,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<ResourceId, Stream>,
    calls: HashMap<(Operation, ResourceId), usize>,
    faults: HashMap<(Operation, ResourceId), Fault>,
}

/// Destination store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed an existing, initialized resource.
    pub fn with_resource(self, id: impl Into<ResourceId>, records: Vec<CanonicalRecord>) -> Self {
        self.lock().streams.insert(
            id.into(),
            Stream {
                initialized: true,
                records,
            },
        );
        self
    }

    /// Sleep this long at the start of every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make `op` on `id` fail with `message`.
    pub fn fail_on(&self, op: Operation, id: impl Into<ResourceId>, message: impl Into<String>) {
        self.lock()
            .faults
            .insert((op, id.into()), Fault::Fail(message.into()));
    }

    /// Make `op` on `id` never return.
    pub fn hang_on(&self, op: Operation, id: impl Into<ResourceId>) {
        self.lock().faults.insert((op, id.into()), Fault::Hang);
    }

    /// Number of `op` calls across all resources.
    pub fn calls(&self, op: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|((o, _), _)| *o == op)
            .map(|(_, n)| n)
            .sum()
    }

    /// Number of `op` calls against `id`.
    pub fn calls_for(&self, op: Operation, id: &ResourceId) -> usize {
        self.lock()
            .calls
            .get(&(op, id.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Records stored under `id`, in write order.
    pub fn records(&self, id: &ResourceId) -> Vec<CanonicalRecord> {
        self.lock()
            .streams
            .get(id)
            .map(|s| s.records.clone())
            .unwrap_or_default()
    }

    /// Whether `id` has been created and initialized.
    pub fn is_initialized(&self, id: &ResourceId) -> bool {
        self.lock()
            .streams
            .get(id)
            .is_some_and(|s| s.initialized)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call, apply latency and any injected fault.
    async fn enter(&self, op: Operation, id: &ResourceId) -> Result<(), DestinationError> {
        let fault = {
            let mut inner = self.lock();
            *inner.calls.entry((op, id.clone())).or_insert(0) += 1;
            inner.faults.get(&(op, id.clone())).cloned()
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match fault {
            None => Ok(()),
            Some(Fault::Fail(message)) => Err(DestinationError::Rejected {
                resource: id.to_string(),
                operation: op.to_string(),
                message,
            }),
            Some(Fault::Hang) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl DestinationStore for MemoryStore {
    async fn exists(&self, id: &ResourceId) -> Result<bool, DestinationError> {
        self.enter(Operation::Exists, id).await?;
        Ok(self.lock().streams.get(id).is_some_and(|s| s.initialized))
    }

    async fn create(&self, id: &ResourceId) -> Result<(), DestinationError> {
        self.enter(Operation::Create, id).await?;
        self.lock().streams.entry(id.clone()).or_default();
        Ok(())
    }

    async fn initialize(&self, id: &ResourceId) -> Result<(), DestinationError> {
        self.enter(Operation::Initialize, id).await?;
        match self.lock().streams.get_mut(id) {
            Some(stream) => {
                stream.initialized = true;
                Ok(())
            }
            None => Err(DestinationError::Rejected {
                resource: id.to_string(),
                operation: Operation::Initialize.to_string(),
                message: "resource has not been deployed".to_string(),
            }),
        }
    }

    async fn read_all(&self, id: &ResourceId) -> Result<Vec<CanonicalRecord>, DestinationError> {
        self.enter(Operation::ReadAll, id).await?;
        match self.lock().streams.get(id) {
            Some(stream) if stream.initialized => Ok(stream.records.clone()),
            _ => Err(DestinationError::NotInitialized {
                resource: id.to_string(),
            }),
        }
    }

    async fn write(&self, id: &ResourceId, records: &[CanonicalRecord]) -> Result<usize, DestinationError> {
        self.enter(Operation::Write, id).await?;
        match self.lock().streams.get_mut(id) {
            Some(stream) if stream.initialized => {
                let fresh = new_keys(&stream.records, records);
                stream.records.extend_from_slice(&fresh);
                Ok(fresh.len())
            }
            _ => Err(DestinationError::NotInitialized {
                resource: id.to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
