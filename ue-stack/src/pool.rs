/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Background worker pool.
//!
//! A fixed number of threads execute operations that may block (radio cell
//! search, cell selection, I/O) so the executor never stalls on them.  A
//! background task must not touch protocol-layer state: it performs the
//! blocking call and then reports the result back onto the dispatcher's
//! background queue, where the follow-up runs on the executor thread.
//!
//! Workers share one MPMC channel, so assignment is "first idle worker
//! wins".  All workers are equivalent; no fairness between them is needed.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::targets;

/// Index of the worker thread running a background task (`0..size`).
pub type WorkerId = u32;

/// A unit of blocking work.  Receives the id of the worker running it.
pub type BackgroundTask = Box<dyn FnOnce(WorkerId) + Send + 'static>;

pub struct WorkerPool {
    /// `None` once [`stop`](Self::stop) has been called.
    sender: Mutex<Option<Sender<BackgroundTask>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("running", &self.is_running())
            .finish()
    }
}

impl WorkerPool {
    /// Spawns `size` worker threads (named `WORKER-<id>`).
    ///
    /// # Errors
    /// Returns the OS error if a thread cannot be spawned; workers spawned
    /// before the failure are shut down again.
    pub fn new(size: usize) -> io::Result<Self> {
        let (tx, rx) = unbounded::<BackgroundTask>();
        let mut workers = Vec::with_capacity(size);

        for id in 0..size {
            let rx = rx.clone();
            let worker_id = id as WorkerId;
            let spawned = thread::Builder::new()
                .name(format!("WORKER-{id}"))
                .spawn(move || worker_loop(worker_id, rx));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    drop(tx);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(e);
                }
            }
        }

        info!(target: targets::POOL, size, "background worker pool started");
        Ok(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            size,
        })
    }

    /// Hands `task` to the first idle worker.
    ///
    /// Returns `false` if the pool has been stopped.
    pub fn push_task<F>(&self, task: F) -> bool
    where
        F: FnOnce(WorkerId) + Send + 'static,
    {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(Box::new(task)).is_ok(),
            None => false,
        }
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Stops accepting work, lets the workers finish what is queued, and
    /// joins them.  Idempotent.
    ///
    /// Called from a worker thread, that worker is detached instead of
    /// joined.
    pub fn stop(&self) {
        // Dropping the last sender ends every worker's receive loop.
        let Some(tx) = self.sender.lock().take() else {
            return;
        };
        drop(tx);

        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for handle in workers {
            // The last owner of the pool may be one of its own tasks.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!(target: targets::POOL, "background worker terminated abnormally");
            }
        }
        info!(target: targets::POOL, "background worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(id: WorkerId, rx: Receiver<BackgroundTask>) {
    debug!(target: targets::POOL, worker = id, "worker started");
    for task in rx.iter() {
        // A panicking task must not shrink the pool.
        if panic::catch_unwind(AssertUnwindSafe(|| task(id))).is_err() {
            error!(target: targets::POOL, worker = id, "background task panicked");
        }
    }
    debug!(target: targets::POOL, worker = id, "worker exiting");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn executes_every_task() {
        let pool = WorkerPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            assert!(pool.push_task(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn worker_ids_are_within_pool_size() {
        let pool = WorkerPool::new(3).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        for _ in 0..30 {
            let tx = tx.clone();
            pool.push_task(move |id| {
                tx.send(id).unwrap();
            });
        }
        pool.stop();
        drop(tx);
        let ids: HashSet<WorkerId> = rx.iter().collect();
        assert!(!ids.is_empty());
        assert!(ids.iter().all(|&id| id < 3));
    }

    #[test]
    fn blocking_tasks_run_in_parallel() {
        let pool = WorkerPool::new(2).unwrap();
        // Both tasks must be inside the barrier at the same time; with a
        // single effective worker this would deadlock.
        let barrier = Arc::new(Barrier::new(3));
        for _ in 0..2 {
            let barrier = Arc::clone(&barrier);
            pool.push_task(move |_| {
                barrier.wait();
            });
        }
        barrier.wait();
        pool.stop();
    }

    #[test]
    fn panicking_task_does_not_kill_the_worker() {
        let pool = WorkerPool::new(1).unwrap();
        pool.push_task(|_| panic!("boom"));
        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.push_task(move |_| {
            tx.send(()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn push_after_stop_is_rejected_and_stop_is_idempotent() {
        let pool = WorkerPool::new(1).unwrap();
        assert!(pool.is_running());
        pool.stop();
        pool.stop();
        assert!(!pool.is_running());
        assert!(!pool.push_task(|_| {}));
        assert_eq!(pool.size(), 1);
    }
}
