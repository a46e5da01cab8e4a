//! Directory-backed destination store.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/<resource>/stream.json      written by initialize
//! <root>/<resource>/records.ndjson   one CanonicalRecord per line
//! ```
//!
//! A stream exists once `stream.json` is written; a bare directory left by
//! an interrupted run is initialized again. Writes to one stream are
//! serialized within the process so concurrent branches never append the
//! same key twice.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{DestinationStore, new_keys};
use crate::error::{
    DestinationCodecSnafu, DestinationError, DestinationIoSnafu, NotInitializedSnafu, RejectedSnafu,
};
use crate::lifecycle::ResourceId;
use crate::record::CanonicalRecord;

const METADATA_FILE: &str = "stream.json";
const RECORDS_FILE: &str = "records.ndjson";

#[derive(Debug, Serialize, Deserialize)]
struct StreamMetadata {
    stream_id: ResourceId,
    initialized_at: DateTime<Utc>,
}

type WriteLock = Arc<tokio::sync::Mutex<()>>;

/// Stores each resource as a directory of NDJSON records.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    write_locks: Arc<Mutex<HashMap<ResourceId, WriteLock>>>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stream_dir(&self, id: &ResourceId) -> Result<PathBuf, DestinationError> {
        let name = id.as_str();
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        ensure!(
            valid,
            RejectedSnafu {
                resource: name,
                operation: "resolve",
                message: "resource id is not a valid directory name",
            }
        );
        Ok(self.root.join(name))
    }

    async fn is_initialized(&self, dir: &Path, id: &ResourceId) -> Result<bool, DestinationError> {
        tokio::fs::try_exists(dir.join(METADATA_FILE))
            .await
            .context(DestinationIoSnafu {
                resource: id.as_str(),
            })
    }

    fn write_lock(&self, id: &ResourceId) -> WriteLock {
        let mut locks = self.write_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    async fn read_records(&self, dir: &Path, id: &ResourceId) -> Result<Vec<CanonicalRecord>, DestinationError> {
        let text = match tokio::fs::read_to_string(dir.join(RECORDS_FILE)).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).context(DestinationIoSnafu {
                    resource: id.as_str(),
                });
            }
        };

        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).context(DestinationCodecSnafu {
                    resource: id.as_str(),
                    line: index + 1,
                })
            })
            .collect()
    }

    async fn require_initialized(&self, id: &ResourceId) -> Result<PathBuf, DestinationError> {
        let dir = self.stream_dir(id)?;
        ensure!(
            self.is_initialized(&dir, id).await?,
            NotInitializedSnafu {
                resource: id.as_str(),
            }
        );
        Ok(dir)
    }
}

#[async_trait]
impl DestinationStore for LocalStore {
    async fn exists(&self, id: &ResourceId) -> Result<bool, DestinationError> {
        let dir = self.stream_dir(id)?;
        self.is_initialized(&dir, id).await
    }

    async fn create(&self, id: &ResourceId) -> Result<(), DestinationError> {
        let dir = self.stream_dir(id)?;
        tokio::fs::create_dir_all(&dir).await.context(DestinationIoSnafu {
            resource: id.as_str(),
        })?;
        debug!(resource = %id, path = %dir.display(), "Created stream directory");
        Ok(())
    }

    async fn initialize(&self, id: &ResourceId) -> Result<(), DestinationError> {
        let dir = self.stream_dir(id)?;
        let metadata = StreamMetadata {
            stream_id: id.clone(),
            initialized_at: Utc::now(),
        };
        let body = serde_json::to_vec_pretty(&metadata).context(DestinationCodecSnafu {
            resource: id.as_str(),
            line: 0usize,
        })?;
        tokio::fs::write(dir.join(METADATA_FILE), body)
            .await
            .context(DestinationIoSnafu {
                resource: id.as_str(),
            })
    }

    async fn read_all(&self, id: &ResourceId) -> Result<Vec<CanonicalRecord>, DestinationError> {
        let dir = self.require_initialized(id).await?;
        self.read_records(&dir, id).await
    }

    async fn write(&self, id: &ResourceId, records: &[CanonicalRecord]) -> Result<usize, DestinationError> {
        let dir = self.require_initialized(id).await?;
        let lock = self.write_lock(id);
        let _guard = lock.lock().await;

        let stored = self.read_records(&dir, id).await?;
        let fresh = new_keys(&stored, records);
        if fresh.is_empty() {
            debug!(resource = %id, skipped = records.len(), "Nothing new to append");
            return Ok(0);
        }

        let mut buf = Vec::new();
        for record in &fresh {
            serde_json::to_writer(&mut buf, record).context(DestinationCodecSnafu {
                resource: id.as_str(),
                line: 0usize,
            })?;
            buf.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(RECORDS_FILE))
            .await
            .context(DestinationIoSnafu {
                resource: id.as_str(),
            })?;
        file.write_all(&buf).await.context(DestinationIoSnafu {
            resource: id.as_str(),
        })?;
        file.flush().await.context(DestinationIoSnafu {
            resource: id.as_str(),
        })?;

        debug!(
            resource = %id,
            count = fresh.len(),
            skipped = records.len() - fresh.len(),
            "Appended records"
        );
        Ok(fresh.len())
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}
