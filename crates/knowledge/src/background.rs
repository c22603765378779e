//! Bounded fire-and-forget work.
//!
//! Persistence copies, memory appends and self-ingestion run here so they
//! never delay or fail the caller's response. Failures end up in the log.

use ark_core::AppResult;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

/// Tracks detached tasks and caps how many run at once.
#[derive(Debug, Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
}

impl BackgroundTasks {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run `task` in the background; an error is logged under `label`.
    pub fn spawn<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = AppResult<()>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!("Background task '{}' skipped: pool closed", label);
                return;
            };

            match task.await {
                Ok(()) => tracing::trace!("Background task '{}' finished", label),
                Err(e) => tracing::warn!("Background task '{}' failed: {}", label, e),
            }
        });
    }

    /// Number of tasks not yet finished.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task spawned so far has finished.
    ///
    /// New tasks may still be spawned afterwards.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new(4)
    }
}
