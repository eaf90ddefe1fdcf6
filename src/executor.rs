//! Offload helpers for blocking work.
//!
//! Two paths, both of which look like a single `.await` to callers:
//!
//! - [`WorkerPool`]: bounded pool for CPU-bound parsing and chunking. At most
//!   `size` jobs run at once; the rest wait for a permit without blocking the
//!   runtime.
//! - [`offload_io`]: unbounded blocking offload for vector store calls,
//!   which may wait on disk for a long time.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum OffloadError {
    #[error("worker pool is closed")]
    Closed,

    #[error("offloaded task panicked: {0}")]
    Panicked(String),

    #[error("offloaded task was cancelled")]
    Cancelled,
}

impl From<JoinError> for OffloadError {
    fn from(err: JoinError) -> Self {
        if err.is_cancelled() {
            OffloadError::Cancelled
        } else {
            OffloadError::Panicked(err.to_string())
        }
    }
}

/// Bounded executor for CPU-bound jobs.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool running at most `size` jobs concurrently (minimum 1).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job` on a blocking thread once a pool slot is free.
    ///
    /// The permit moves into the job and is released when it finishes, even
    /// if the awaiting task has been dropped in the meantime.
    pub async fn run<F, T>(&self, job: F) -> Result<T, OffloadError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| OffloadError::Closed)?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });
        Ok(handle.await?)
    }
}

/// Run a long-latency blocking call (store I/O) off the
/// scheduler thread.
pub async fn offload_io<F, T>(job: F) -> Result<T, OffloadError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(job).await?)
}
