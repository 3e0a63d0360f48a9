//! Tracking of background hook tasks.
//!
//! Background handlers are spawned and forgotten by the caller, but held in
//! a `JoinSet` so the host can drain them before shutting down.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::warn;

/// Spawned background hook tasks awaiting drain.
#[derive(Clone, Default)]
pub struct BackgroundTracker {
    tasks: Arc<Mutex<JoinSet<()>>>,
    pending: Arc<AtomicUsize>,
}

impl BackgroundTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` and track it.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let pending = Arc::clone(&self.pending);
        let _ = pending.fetch_add(1, Ordering::SeqCst);

        let task = async move {
            future.await;
            let _ = pending.fetch_sub(1, Ordering::SeqCst);
        };
        if let Ok(mut tasks) = self.tasks.try_lock() {
            let _ = tasks.spawn(task);
        } else {
            // a drain holds the set; register once it lets go
            let tasks = Arc::clone(&self.tasks);
            drop(tokio::spawn(async move {
                let _ = tasks.lock().await.spawn(task);
            }));
        }
    }

    /// Wait for every tracked task. Panics inside tasks are logged.
    pub async fn drain_all(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "background hook task panicked");
            }
        }
    }

    /// [`drain_all`](Self::drain_all) bounded by `timeout`. Returns whether
    /// everything finished.
    pub async fn drain_with_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.drain_all()).await.is_ok()
    }

    /// Tasks spawned and not yet finished.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for BackgroundTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTracker")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}
