//! Bounded work queue and the worker pool that drains it.

use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// A unit of work as seen by the pool.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Default)]
struct Counters {
    total: AtomicUsize,
    active: AtomicUsize,
    queued: AtomicUsize,
}

/// Increments a counter for as long as it is alive.
struct Occupancy<'a>(&'a AtomicUsize);

impl<'a> Occupancy<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Occupancy<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fixed-capacity queue consumed by a fixed set of workers.
///
/// Enqueueing is a single `try_send`: a full queue is reported as
/// [`Error::CapacityExceeded`] and never blocks the submitter.
pub struct WorkerPool {
    sender: RwLock<Option<mpsc::Sender<Job>>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    capacity: usize,
    counters: Arc<Counters>,
    workers: Mutex<JoinSet<()>>,
}

impl WorkerPool {
    /// Create a pool with an empty queue of `capacity` slots and no workers.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("queue capacity must be at least 1".into()));
        }
        let (tx, rx) = mpsc::channel(capacity);
        Ok(Self {
            sender: RwLock::new(Some(tx)),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            capacity,
            counters: Arc::new(Counters::default()),
            workers: Mutex::new(JoinSet::new()),
        })
    }

    /// Offer one job to the queue.
    pub fn submit(&self, job: Job) -> Result<()> {
        let sender = self.sender.read();
        let Some(tx) = sender.as_ref() else {
            return Err(Error::Stopped);
        };
        // Count first so a worker that dequeues immediately never underflows.
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        tx.try_send(job).map_err(|e| {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            match e {
                TrySendError::Full(_) => Error::CapacityExceeded,
                TrySendError::Closed(_) => Error::Stopped,
            }
        })
    }

    /// Start `n` workers. Must be called from within a tokio runtime.
    pub fn spawn(&self, n: usize) {
        let mut workers = self.workers.lock();
        for worker in 0..n {
            let receiver = Arc::clone(&self.receiver);
            let counters = Arc::clone(&self.counters);
            workers.spawn(worker_loop(worker, receiver, counters));
        }
        info!(workers = n, capacity = self.capacity, "worker pool spawned");
    }

    /// Close the queue. Jobs already queued still run; workers exit once it
    /// is drained.
    pub fn stop(&self) {
        if self.sender.write().take().is_some() {
            info!("work queue closed");
        }
    }

    /// Stop, then wait up to `grace` for the workers to drain the queue.
    ///
    /// Workers still running when the grace period ends are aborted.
    /// Returns `true` if every worker exited on its own.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.stop();
        let mut workers = std::mem::take(&mut *self.workers.lock());

        let drained = tokio::time::timeout(grace, async {
            while workers.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                remaining = workers.len(),
                grace_ms = grace.as_millis() as u64,
                "grace period expired, aborting workers"
            );
            workers.shutdown().await;
        }
        drained
    }

    /// Workers that have started and not yet exited.
    pub fn total_workers(&self) -> usize {
        self.counters.total.load(Ordering::SeqCst)
    }

    /// Workers currently executing a job.
    pub fn active_workers(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs sitting in the queue, not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.counters.queued.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.read().is_none()
    }
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    counters: Arc<Counters>,
) {
    let _live = Occupancy::enter(&counters.total);
    debug!(worker, "worker started");

    loop {
        // Hold the receiver only while waiting, never while executing.
        let next = receiver.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };

        counters.queued.fetch_sub(1, Ordering::SeqCst);
        let _busy = Occupancy::enter(&counters.active);
        job.await;
    }

    debug!(worker, "worker exited");
}
