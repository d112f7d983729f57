//! Bounded pool for heavyweight jobs.
//!
//! Each harvest or batch may own a whole browser, so the number running at
//! once is capped process-wide. Jobs past the cap wait for a permit.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// The pool was closed while a job was waiting for a slot.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("job pool is closed")]
pub struct PoolClosed;

/// Semaphore-backed job limiter. Clones share the same permits.
#[derive(Clone)]
pub struct JobPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl JobPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held by a running job.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a slot and hold it until the returned permit drops.
    pub async fn slot(&self) -> Result<OwnedSemaphorePermit, PoolClosed> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolClosed)
    }

    /// Run `fut` once a slot is free. The slot is released when it completes.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, PoolClosed>
    where
        F: Future<Output = T>,
    {
        let _permit = self.slot().await?;
        Ok(fut.await)
    }

    /// Refuse further jobs; waiters get [`PoolClosed`].
    pub fn close(&self) {
        self.semaphore.close();
    }
}
