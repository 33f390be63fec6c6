//! Fixed pool of worker threads for namespace-sensitive tasks.
//!
//! The active network namespace is per-thread kernel state. Every worker is
//! a dedicated OS thread for its whole life and returns to the pool's home
//! namespace after each task, so a task that `setns()`s somewhere cannot
//! leak that switch into the next task it runs.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use netns_kit::NetNs;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{FabricError, Result};

/// Queued tasks allowed per worker before `submit` blocks.
const QUEUE_DEPTH: usize = 64;

type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

struct Shared {
    home: NetNs,
    pending: Mutex<usize>,
    drained: Condvar,
    failed: AtomicBool,
    errors: Sender<FabricError>,
}

impl Shared {
    fn report(&self, err: FabricError) {
        self.failed.store(true, Ordering::Release);
        // The pool owns the receiver for as long as workers run.
        let _ = self.errors.send(err);
    }

    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }
}

/// Bounded pool of namespace-pinned workers.
///
/// Submit tasks, then call [`wait`](Self::wait) as a barrier and check
/// [`has_error`](Self::has_error). Tasks are never cancelled: a failing task
/// does not stop its siblings.
pub struct TaskPool {
    tx: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
    errors: Receiver<FabricError>,
}

impl TaskPool {
    /// Spawn `size` workers (at least one). Their home namespace is the
    /// calling thread's current one.
    pub fn new(size: usize) -> Result<Self> {
        let size = size.max(1);
        let home = NetNs::current()
            .map_err(|e| FabricError::namespace("open pool home namespace", e))?;
        let (tx, rx) = crossbeam_channel::bounded::<Task>(size * QUEUE_DEPTH);
        let (err_tx, err_rx) = crossbeam_channel::unbounded();

        let shared = Arc::new(Shared {
            home,
            pending: Mutex::new(0),
            drained: Condvar::new(),
            failed: AtomicBool::new(false),
            errors: err_tx,
        });

        let mut workers = Vec::with_capacity(size);
        for idx in 0..size {
            let rx = rx.clone();
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("netfab-worker-{idx}"))
                .spawn(move || worker_loop(idx, rx, shared))?;
            workers.push(handle);
        }
        debug!(workers = size, "task pool started");

        Ok(Self {
            tx: Some(tx),
            workers,
            shared,
            errors: err_rx,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue `task`. Blocks only while the queue is full.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let tx = self.tx.as_ref().ok_or(FabricError::PoolClosed)?;
        *self.shared.pending.lock() += 1;
        if tx.send(Box::new(task)).is_err() {
            self.shared.finish_one();
            return Err(FabricError::PoolClosed);
        }
        Ok(())
    }

    /// Block until every submitted task has finished.
    pub fn wait(&self) {
        let mut pending = self.shared.pending.lock();
        while *pending > 0 {
            self.shared.drained.wait(&mut pending);
        }
    }

    /// Sticky: `true` once any task has failed.
    pub fn has_error(&self) -> bool {
        self.shared.failed.load(Ordering::Acquire)
    }

    /// Take every error reported so far, oldest first.
    pub fn drain_errors(&self) -> Vec<FabricError> {
        self.errors.try_iter().collect()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Closing the queue ends each worker's receive loop.
        self.tx.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("task pool worker exited abnormally");
            }
        }
    }
}

fn worker_loop(idx: usize, rx: Receiver<Task>, shared: Arc<Shared>) {
    for task in rx.iter() {
        run_task(&shared, task);
        shared.finish_one();
    }
    debug!(worker = idx, "task pool worker stopped");
}

fn run_task(shared: &Shared, task: Task) {
    // A previous failed restore leaves the worker elsewhere; retry before
    // running anything and skip the task if the worker is still displaced.
    if let Err(e) = shared.home.enter() {
        shared.report(FabricError::namespace("return worker to home namespace", e));
        return;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(task))
        .unwrap_or_else(|payload| Err(FabricError::TaskPanicked(panic_message(&*payload))));
    if let Err(e) = outcome {
        shared.report(e);
    }

    if let Err(e) = shared.home.enter() {
        warn!(error = %e, "worker could not return to its home namespace");
        shared.report(FabricError::namespace("return worker to home namespace", e));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
