//! Admission and state tracking.
//!
//! The tracker dedupes incoming ids, hands admitted tasks to the worker
//! pool, and keeps the waiting/running sets current from the events the
//! tasks emit. Its event loop is the only place ids move from waiting to
//! running and out of running.

use opentelemetry::KeyValue;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::OnceLock;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::pool::WorkerPool;
use super::task::SimulatedTask;
use crate::error::{Error, Result};
use crate::event::{EventSink, TaskEvent};
use crate::model::{Admission, Statistics, TaskBatch, TaskId};
use crate::telemetry::metrics;

#[derive(Debug, Default)]
struct Membership {
    waiting: BTreeSet<TaskId>,
    running: BTreeSet<TaskId>,
}

impl Membership {
    fn contains(&self, id: &TaskId) -> bool {
        self.waiting.contains(id) || self.running.contains(id)
    }
}

pub struct Tracker {
    pool: Arc<WorkerPool>,
    membership: RwLock<Membership>,
    events: EventSink,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<TaskEvent>>>,
    shutdown: OnceLock<CancellationToken>,
    started: Notify,
}

impl Tracker {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        let (events, inbox) = EventSink::channel();
        Self {
            pool,
            membership: RwLock::new(Membership::default()),
            events,
            inbox: Mutex::new(Some(inbox)),
            shutdown: OnceLock::new(),
            started: Notify::new(),
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Whether [`run`](Self::run) has been started.
    pub fn is_running(&self) -> bool {
        self.shutdown.get().is_some()
    }

    /// Resolves once [`run`](Self::run) has started; at once if it already has.
    pub async fn started(&self) {
        let notified = self.started.notified();
        tokio::pin!(notified);
        // Register before checking, so a `run` landing in between still wakes us.
        notified.as_mut().enable();
        if self.is_running() {
            return;
        }
        notified.await;
    }

    /// Events discarded because the loop had already exited.
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }

    /// Admit a batch of tasks.
    ///
    /// Fails with [`Error::NotRunning`] before the loop has started and
    /// with [`Error::Cancelled`] once shutdown has begun.
    ///
    /// Ids already waiting or running are skipped. The rest are enqueued
    /// and marked waiting in id order. If the queue rejects an id the call
    /// fails with that error, and ids enqueued before it in this call stay
    /// waiting and queued. The rejected id is never marked, and ids after
    /// it are not looked at.
    ///
    /// The dedupe check, the enqueue and the mark happen under one write
    /// lock, so a concurrent caller never skips an id that is not queued.
    pub fn submit_batch(&self, tasks: &TaskBatch) -> Result<Admission> {
        let shutdown = self.shutdown.get().ok_or(Error::NotRunning)?;
        if shutdown.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut admission = Admission::default();

        for (id, duration) in tasks {
            let mut membership = self.membership.write();
            if membership.contains(id) {
                debug!(task.id = %id, "already tracked, skipping");
                metrics::tasks_submitted().add(1, &[KeyValue::new("result", "duplicate")]);
                admission.skipped.push(id.clone());
                continue;
            }

            let task = SimulatedTask {
                id: id.clone(),
                duration: *duration,
                events: self.events.clone(),
                shutdown: shutdown.clone(),
            };

            // The loop applies this task's Started only after we release
            // the lock, so marking after the enqueue is never late.
            if let Err(e) = self.pool.submit(task.into_job()) {
                drop(membership);
                metrics::tasks_submitted().add(1, &[KeyValue::new("result", "rejected")]);
                warn!(
                    task.id = %id,
                    accepted = admission.accepted.len(),
                    error = %e,
                    "batch rejected by work queue"
                );
                return Err(e);
            }
            membership.waiting.insert(id.clone());
            drop(membership);

            metrics::tasks_submitted().add(1, &[KeyValue::new("result", "accepted")]);
            debug!(task.id = %id, duration_s = duration.as_secs(), "task queued");
            admission.accepted.push(id.clone());
        }

        Ok(admission)
    }

    /// Sorted snapshot of the waiting and running ids.
    pub fn statistics(&self) -> Statistics {
        let membership = self.membership.read();
        Statistics {
            waiting: membership.waiting.iter().cloned().collect(),
            running: membership.running.iter().cloned().collect(),
        }
    }

    /// Run the event loop until `shutdown` fires.
    ///
    /// May be called once per tracker. Returns [`Error::Cancelled`] on
    /// shutdown; events emitted after that are dropped and counted.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut inbox = self.inbox.lock().take().ok_or(Error::AlreadyRunning)?;
        self.shutdown
            .set(shutdown.clone())
            .map_err(|_| Error::AlreadyRunning)?;
        self.started.notify_waiters();

        info!("tracker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("tracker shutting down");
                    return Err(Error::Cancelled);
                }
                event = inbox.recv() => match event {
                    Some(event) => self.apply(event),
                    // Unreachable while `self.events` holds a sender.
                    None => return Ok(()),
                },
            }
        }
    }

    fn apply(&self, event: TaskEvent) {
        let mut membership = self.membership.write();
        match event {
            TaskEvent::Started(id) => {
                if !membership.waiting.remove(&id) {
                    warn!(task.id = %id, "started task was not waiting");
                }
                debug!(task.id = %id, "waiting -> running");
                membership.running.insert(id);
                metrics::state_transitions().add(
                    1,
                    &[KeyValue::new("from", "waiting"), KeyValue::new("to", "running")],
                );
            }
            TaskEvent::Completed(id) => {
                if !membership.running.remove(&id) {
                    warn!(task.id = %id, "completed task was not running");
                }
                debug!(task.id = %id, "running -> done");
                metrics::state_transitions().add(
                    1,
                    &[KeyValue::new("from", "running"), KeyValue::new("to", "done")],
                );
            }
        }
    }
}
