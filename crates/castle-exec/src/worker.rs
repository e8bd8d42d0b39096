//! Fixed-size worker pool for blocking work.
//!
//! Workers spin on a lock-free queue and yield the CPU when it is empty.
//! That keeps wake-up latency low for short database tasks at the price
//! of some idle CPU, which is fine for a pool of two or three threads.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::PoolError;

/// A unit of work. Runs at most once, on some worker thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of threads executing submitted [`Task`]s.
///
/// Tasks submitted independently have no ordering guarantee relative to
/// each other. A task that needs to touch reactor state must go through a
/// [`LoopMarshaler`](crate::LoopMarshaler).
pub struct WorkerPool {
    queue: Sender<Task>,
    running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        let threads = threads.max(1);
        let (queue, rx) = crossbeam_channel::unbounded::<Task>();
        let running = Arc::new(AtomicBool::new(true));

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let rx = rx.clone();
            let flag = Arc::clone(&running);
            let handle = thread::Builder::new()
                .name(format!("castle-worker-{index}"))
                .spawn(move || work(index, rx, flag));
            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Stop whatever already started before bailing out.
                    running.store(false, Ordering::Release);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        info!(threads, "worker pool started");

        Ok(Self {
            queue,
            running,
            workers: Mutex::new(workers),
        })
    }

    /// Enqueues `task` for execution.
    ///
    /// # Errors
    /// [`PoolError::ShutDown`] once [`shutdown`](Self::shutdown) has run.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.running.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }
        self.queue
            .send(Box::new(task))
            .map_err(|_| PoolError::ShutDown)
    }

    /// Whether the pool still accepts work.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of tasks waiting to be picked up.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Stops accepting work and joins every worker.
    ///
    /// A worker finishes the task it is currently running; anything still
    /// queued is dropped without running. Safe to call more than once.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        let current = thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        let count = workers.len();
        for worker in workers {
            // A task that drops the last reference to the pool ends up here
            // on its own worker thread; joining itself would deadlock.
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                error!("worker thread panicked outside a task");
            }
        }

        info!(workers = count, dropped = self.queue.len(), "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn work(index: usize, rx: Receiver<Task>, running: Arc<AtomicBool>) {
    debug!(worker = index, "worker started");

    while running.load(Ordering::Acquire) {
        match rx.try_recv() {
            Ok(task) => {
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!(worker = index, "task panicked");
                }
            }
            Err(TryRecvError::Empty) => thread::yield_now(),
            Err(TryRecvError::Disconnected) => break,
        }
    }

    debug!(worker = index, "worker exiting");
}
