//! Lifecycle notifications emitted by running tasks.
//!
//! Tasks are the only producers; the tracker loop is the only consumer.
//! Both kinds travel on one channel so a task's `Started` is always seen
//! before its `Completed`.

use opentelemetry::KeyValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::model::TaskId;
use crate::telemetry::metrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Started(TaskId),
    Completed(TaskId),
}

impl TaskEvent {
    pub fn id(&self) -> &TaskId {
        match self {
            TaskEvent::Started(id) | TaskEvent::Completed(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TaskEvent::Started(_) => "started",
            TaskEvent::Completed(_) => "completed",
        }
    }
}

/// Sending half handed to every task.
///
/// Emitting never blocks. When the tracker loop is gone the event is
/// discarded and counted.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TaskEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, rx)
    }

    pub fn emit(&self, event: TaskEvent) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::events_dropped().add(1, &[KeyValue::new("kind", event.kind())]);
            debug!(task.id = %event.id(), kind = event.kind(), "tracker gone, event dropped");
        }
    }

    /// Events that could not be delivered.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
