//! Bounded worker pool for per-package download fan-out.
//!
//! `run` submits one job per item and returns only once every job has
//! finished, successfully or not. At most `capacity` jobs execute at once.
//! A panicking job is caught and reported as a failed item; it never takes
//! down the pool or the run.

use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::error::{SyncError, SyncResult};

/// Fixed-capacity pool of worker threads.
pub struct WorkerPool {
    pool: ThreadPool,
    capacity: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool with `capacity` threads (minimum 1).
    pub fn new(capacity: usize) -> SyncResult<Self> {
        let capacity = capacity.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(capacity)
            .thread_name(|i| format!("pkgmirror-worker-{}", i))
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("failed to start worker pool: {}", e)))?;
        Ok(Self { pool, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run `job` over every item and wait for all of them to finish.
    ///
    /// Results come back in submission order. A job that panics yields `None`.
    pub fn run<T, R, F>(&self, items: &[T], job: F) -> Vec<Option<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        let slots: Vec<Mutex<Option<R>>> = items.iter().map(|_| Mutex::new(None)).collect();

        self.pool.scope(|scope| {
            for (item, slot) in items.iter().zip(&slots) {
                let job = &job;
                scope.spawn(move |_| {
                    if let Ok(result) = panic::catch_unwind(AssertUnwindSafe(|| job(item))) {
                        *slot.lock() = Some(result);
                    }
                });
            }
        });

        slots.into_iter().map(Mutex::into_inner).collect()
    }
}
