//! Per-task span helpers.

use std::time::Duration;
use tracing::Span;

use crate::model::TaskId;

/// Start the span a task runs in.
pub fn start_task_span(id: &TaskId, duration: Duration) -> Span {
    tracing::info_span!(
        "task.execute",
        "task.id" = %id,
        "task.duration_s" = duration.as_secs(),
    )
}

/// Point in a task's own execution.
///
/// Distinct from the waiting/running membership the tracker keeps: the
/// tracker logs those moves when it applies the task's events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Started,
    Finished,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Started => "started",
            TaskPhase::Finished => "finished",
        }
    }
}

/// Record a task phase event on the given span.
pub fn record_task_phase(span: &Span, phase: TaskPhase) {
    span.in_scope(|| {
        tracing::info!(phase = phase.as_str(), "task_phase");
    });
}
