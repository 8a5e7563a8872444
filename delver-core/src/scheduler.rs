//! Bounded concurrent execution of independent async work units.
//!
//! A semaphore gates task starts so the number of simultaneously running
//! units never exceeds the limit, independent of how many are queued.
//! Results come back in input order, with per-task failures captured
//! rather than propagated, so the caller can merge deterministically.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Outcome of one unit of work in a bounded batch.
#[derive(Debug)]
pub enum BatchOutcome<T> {
    /// The task ran to completion.
    Completed(T),
    /// The task was dropped before starting because the run was cancelled.
    Skipped,
    /// The task panicked or was aborted; the message is for logging only.
    Failed(String),
}

impl<T> BatchOutcome<T> {
    /// Unwrap the completed value, if any.
    pub fn into_completed(self) -> Option<T> {
        match self {
            BatchOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Runs batches of independent futures under a shared concurrency bound.
///
/// The semaphore is shared across every batch submitted to the same
/// scheduler, so a recursive caller fanning out at multiple tree levels
/// still respects one global limit.
pub struct BoundedScheduler {
    semaphore: Arc<Semaphore>,
}

impl BoundedScheduler {
    /// Create a scheduler allowing up to `limit` simultaneous tasks.
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
        }
    }

    /// Run `tasks` concurrently, never exceeding the scheduler's limit.
    ///
    /// The returned vector is in input order. On cancellation,
    /// queued-but-not-started tasks resolve to `Skipped`; tasks already
    /// running finish naturally and their results are kept.
    pub async fn run_bounded<T, F>(
        &self,
        tasks: Vec<F>,
        cancel: &CancellationToken,
    ) -> Vec<BatchOutcome<T>>
    where
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut set: JoinSet<(usize, BatchOutcome<T>)> = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let semaphore = self.semaphore.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                // Wait for a slot; a cancellation that lands first means
                // this task never starts.
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return (index, BatchOutcome::Skipped),
                    permit = semaphore.acquire_owned() => permit,
                };
                let Ok(_permit) = permit else {
                    return (index, BatchOutcome::Skipped);
                };
                if cancel.is_cancelled() {
                    return (index, BatchOutcome::Skipped);
                }
                // Run the unit in its own task so a panic is captured as a
                // join error instead of tearing down the batch.
                match tokio::spawn(task).await {
                    Ok(value) => (index, BatchOutcome::Completed(value)),
                    Err(err) => (index, BatchOutcome::Failed(err.to_string())),
                }
            });
        }

        let mut results: Vec<BatchOutcome<T>> = Vec::new();
        results.resize_with(set.len(), || BatchOutcome::Skipped);
        while let Some(joined) = set.join_next().await {
            if let Ok((index, outcome)) = joined {
                results[index] = outcome;
            }
        }
        results
    }
}
