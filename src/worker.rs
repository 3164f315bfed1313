//! Bounded worker pool.
//!
//! Jobs run on a fixed set of threads. At most `workers + queue_depth` jobs
//! are in flight (running or waiting) at any time; [`WorkerPool::submit`]
//! blocks the caller until a slot frees up.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

use tracing::debug;
use workerpool::thunk::{Thunk, ThunkWorker};
use workerpool::Pool;

#[derive(Debug)]
struct Slots {
    used: Mutex<usize>,
    freed: Condvar,
    capacity: usize,
}

impl Slots {
    fn take(&self) {
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        while *used >= self.capacity {
            used = self
                .freed
                .wait(used)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *used += 1;
    }

    fn release(&self) {
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        *used -= 1;
        self.freed.notify_one();
    }

    fn used(&self) -> usize {
        *self.used.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Gives the slot back even if the job panics.
struct SlotGuard(Arc<Slots>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

pub struct WorkerPool {
    pool: Pool<ThunkWorker<()>>,
    slots: Arc<Slots>,
    workers: usize,
}

impl WorkerPool {
    /// A pool of `workers` threads (at least one) with room for
    /// `queue_depth` extra jobs waiting for a thread.
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        debug!(workers, queue_depth, "starting worker pool");
        Self {
            pool: Pool::<ThunkWorker<()>>::new(workers),
            slots: Arc::new(Slots {
                used: Mutex::new(0),
                freed: Condvar::new(),
                capacity: workers + queue_depth,
            }),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs submitted and not finished yet.
    pub fn in_flight(&self) -> usize {
        self.slots.used()
    }

    /// Run `job` on the pool, waiting for a free slot first.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.slots.take();
        let guard = SlotGuard(self.slots.clone());
        self.pool.execute(Thunk::of(move || {
            let _guard = guard;
            job();
        }));
    }

    /// Wait until every submitted job has finished.
    pub fn join(&self) {
        self.pool.join();
    }
}
