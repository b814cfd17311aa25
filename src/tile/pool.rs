//! Bounded pool for blocking database reads.
//!
//! SQLite lookups block, so each one runs on tokio's blocking thread pool
//! after taking a permit from a semaphore sized by the configured number of
//! read workers. The async request path only ever awaits.
//!
//! # Cancellation
//!
//! A lookup reports back over a oneshot channel. When the request future is
//! dropped (client went away, server shutting down) the receiver goes with
//! it. The worker notices the closed channel, either before starting or when
//! delivering, discards the result, and counts it. Nothing is written for the
//! abandoned request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Semaphore};
use tokio::task;
use tracing::debug;

use crate::error::ServeError;

/// Default number of concurrent database reads.
pub const DEFAULT_READ_WORKERS: usize = 16;

/// Semaphore-bounded runner for blocking lookups. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ReadPool {
    permits: Arc<Semaphore>,
    workers: usize,

    /// Results computed for requests that were gone by the time they finished
    discarded: Arc<AtomicU64>,
}

impl ReadPool {
    /// Pool running at most `workers` lookups at once (minimum 1).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            discarded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run a blocking lookup on a worker and wait for its result.
    ///
    /// Fails with [`ServeError::Cancelled`] once the pool is closed, and with
    /// [`ServeError::Internal`] if the lookup panicked.
    pub async fn run<T, F>(&self, lookup: F) -> Result<T, ServeError>
    where
        F: FnOnce() -> Result<T, ServeError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServeError::Cancelled)?;

        let (tx, rx) = oneshot::channel();
        let discarded = Arc::clone(&self.discarded);

        task::spawn_blocking(move || {
            let _permit = permit;

            if tx.is_closed() {
                discarded.fetch_add(1, Ordering::Relaxed);
                debug!("request gone before lookup started, skipping");
                return;
            }

            let result = lookup();
            if tx.send(result).is_err() {
                discarded.fetch_add(1, Ordering::Relaxed);
                debug!("request gone before lookup finished, result discarded");
            }
        });

        rx.await.map_err(|_| ServeError::Internal {
            message: "read worker exited without a result".to_string(),
        })?
    }

    /// Number of results thrown away because their request was cancelled.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Permits not currently held by a lookup.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Refuse new lookups. Lookups already running finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}

impl Default for ReadPool {
    fn default() -> Self {
        Self::new(DEFAULT_READ_WORKERS)
    }
}
