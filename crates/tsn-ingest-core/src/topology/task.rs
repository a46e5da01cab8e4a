//! Outcome types for keyed tasks.

use std::fmt;

/// Result type for task execution.
pub type TaskResult<T, E> = Result<T, TaskError<E>>;

/// Why a task did not produce a value.
#[derive(Debug)]
pub enum TaskError<E> {
    /// Task never started, or stopped, because the run was cancelled.
    Cancelled,
    /// Task panicked during execution.
    Panicked(String),
    /// Task returned an error.
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for TaskError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "task cancelled"),
            Self::Panicked(msg) => write!(f, "task panicked: {msg}"),
            Self::Failed(err) => write!(f, "task failed: {err}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TaskError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl<E> TaskError<E> {
    /// Check if this is a cancellation error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this is a panic error.
    pub fn is_panicked(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Extract a readable message from a join error's panic payload.
    pub(crate) fn from_join_error(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            return Self::Cancelled;
        }
        let payload = err.into_panic();
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(msg)
    }
}
