//! Simulated task: the runnable built for every admitted id.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, info};

use crate::engine::pool::Job;
use crate::event::{EventSink, TaskEvent};
use crate::model::TaskId;
use crate::telemetry::metrics;
use crate::telemetry::task::{TaskPhase, record_task_phase, start_task_span};

/// Emits `Completed` when dropped.
///
/// Ties completion to the task's scope: a task that finishes, is cut short
/// by cancellation, or is dropped mid-wait by an aborted worker still
/// clears its id from the running set.
struct CompletionGuard {
    id: Option<TaskId>,
    events: EventSink,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.events.emit(TaskEvent::Completed(id));
        }
    }
}

pub(crate) struct SimulatedTask {
    pub id: TaskId,
    pub duration: Duration,
    pub events: EventSink,
    pub shutdown: CancellationToken,
}

impl SimulatedTask {
    /// Box the task into a job for the worker pool.
    pub fn into_job(self) -> Job {
        let span = start_task_span(&self.id, self.duration);
        Box::pin(self.run().instrument(span))
    }

    async fn run(self) {
        let Self {
            id,
            duration,
            events,
            shutdown,
        } = self;

        let start = Instant::now();
        events.emit(TaskEvent::Started(id.clone()));
        record_task_phase(&Span::current(), TaskPhase::Started);
        let _completion = CompletionGuard {
            id: Some(id),
            events,
        };

        let cancelled = tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = shutdown.cancelled() => true,
        };

        let elapsed_ms = start.elapsed().as_millis() as f64;
        metrics::task_duration_ms().record(
            elapsed_ms,
            &[opentelemetry::KeyValue::new("cancelled", cancelled)],
        );
        info!(cancelled, elapsed_ms, "task finished");
        record_task_phase(&Span::current(), TaskPhase::Finished);
    }
}
