//! Keyed fan-out with a bounded worker count and a final join.
//!
//! Every task is spawned onto the runtime immediately and waits for a
//! semaphore permit before doing any work. The runner returns only after
//! every task has produced an outcome, so one failing, panicking or hung
//! task never hides the others.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::task::{TaskError, TaskResult};

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

/// Runs a set of keyed futures concurrently and collects every outcome.
pub struct KeyedRunner<K, T, E> {
    keys: Vec<K>,
    futures: Vec<BoxFuture<T, E>>,
    limit: Option<usize>,
    shutdown: CancellationToken,
    typetag: &'static str,
}

impl<K, T, E> KeyedRunner<K, T, E>
where
    K: Display,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    /// Create an empty runner.
    ///
    /// * `limit` - maximum number of tasks doing work at once (`None` = unbounded)
    /// * `shutdown` - cancelling it stops tasks still waiting for a permit
    /// * `typetag` - label for log lines (e.g. "branch")
    pub fn new(limit: Option<usize>, shutdown: CancellationToken, typetag: &'static str) -> Self {
        Self {
            keys: Vec::new(),
            futures: Vec::new(),
            limit,
            shutdown,
            typetag,
        }
    }

    /// Queue a task. Nothing runs until [`join_all`](Self::join_all).
    pub fn push<F>(&mut self, key: K, future: F)
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.keys.push(key);
        self.futures.push(Box::pin(future));
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no task has been queued.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Run every task and wait for all of them.
    ///
    /// Outcomes are returned in push order, paired with their keys.
    pub async fn join_all(self) -> Vec<(K, TaskResult<T, E>)> {
        let semaphore = self.limit.map(|n| Arc::new(Semaphore::new(n.max(1))));
        let typetag = self.typetag;

        let mut set = JoinSet::new();
        let mut index_by_id = HashMap::new();

        for (index, future) in self.futures.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let shutdown = self.shutdown.clone();

            let handle = set.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => {
                        match shutdown.run_until_cancelled(semaphore.acquire_owned()).await {
                            Some(Ok(permit)) => Some(permit),
                            Some(Err(_)) | None => return Err(TaskError::Cancelled),
                        }
                    }
                    None => None,
                };

                if shutdown.is_cancelled() {
                    return Err(TaskError::Cancelled);
                }

                future.await.map_err(TaskError::Failed)
            });
            index_by_id.insert(handle.id(), index);
        }

        info!("Spawned {} {} tasks", set.len(), typetag);

        let mut outcomes: Vec<Option<TaskResult<T, E>>> =
            std::iter::repeat_with(|| None).take(self.keys.len()).collect();

        while let Some(joined) = set.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(join_error) => (join_error.id(), Err(TaskError::from_join_error(join_error))),
            };
            if let Some(&index) = index_by_id.get(&id) {
                outcomes[index] = Some(outcome);
            }
        }

        let results: Vec<_> = self
            .keys
            .into_iter()
            .zip(outcomes)
            .map(|(key, outcome)| {
                let outcome = outcome.unwrap_or(Err(TaskError::Cancelled));
                match &outcome {
                    Ok(_) => info!(target = %key, "{} completed", typetag),
                    Err(TaskError::Cancelled) => warn!(target = %key, "{} cancelled", typetag),
                    Err(TaskError::Panicked(msg)) => {
                        error!(target = %key, panic = %msg, "{} panicked", typetag)
                    }
                    Err(TaskError::Failed(e)) => {
                        error!(target = %key, error = %e, "{} failed", typetag)
                    }
                }
                (key, outcome)
            })
            .collect();

        info!("All {} {}s finished", results.len(), typetag);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_outcomes_in_push_order() {
        let mut runner = KeyedRunner::<String, u32, String>::new(None, CancellationToken::new(), "test");
        runner.push("slow".to_string(), async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(1)
        });
        runner.push("fast".to_string(), async { Ok(2) });

        let results = runner.join_all().await;
        assert_eq!(results[0].0, "slow");
        assert_eq!(*results[0].1.as_ref().unwrap(), 1);
        assert_eq!(results[1].0, "fast");
        assert_eq!(*results[1].1.as_ref().unwrap(), 2);
    }

    fn explode() -> Result<u32, String> {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn test_failure_and_panic_are_isolated() {
        let mut runner = KeyedRunner::<&str, u32, String>::new(None, CancellationToken::new(), "test");
        runner.push("fails", async { Err("boom".to_string()) });
        runner.push("panics", async { explode() });
        runner.push("ok", async { Ok(7) });

        let results = runner.join_all().await;
        assert!(matches!(&results[0].1, Err(TaskError::Failed(e)) if e == "boom"));
        assert!(matches!(&results[1].1, Err(TaskError::Panicked(m)) if m == "kaboom"));
        assert_eq!(*results[2].1.as_ref().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_limit_bounds_concurrency() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut runner = KeyedRunner::<usize, (), String>::new(Some(2), CancellationToken::new(), "test");
        for i in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            runner.push(i, async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let results = runner.join_all().await;
        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let mut runner = KeyedRunner::<&str, (), String>::new(Some(1), shutdown, "test");
        runner.push("a", async { Ok(()) });
        runner.push("b", async { Ok(()) });

        let results = runner.join_all().await;
        assert!(results.iter().all(|(_, r)| matches!(r, Err(TaskError::Cancelled))));
    }

    #[tokio::test]
    async fn test_empty_runner_joins_immediately() {
        let runner = KeyedRunner::<&str, (), String>::new(None, CancellationToken::new(), "test");
        assert!(runner.is_empty());
        assert!(runner.join_all().await.is_empty());
    }
}
