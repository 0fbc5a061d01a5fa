//! Metric instrument factories for taskexec.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments come from the `"taskexec"` meter; without a provider
//! they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("taskexec")
}

/// Counter: ids offered for admission.
/// Labels: `result` ("accepted" | "duplicate" | "rejected").
pub fn tasks_submitted() -> Counter<u64> {
    meter()
        .u64_counter("taskexec.tasks.submitted")
        .with_description("Number of task ids offered for admission")
        .build()
}

/// Counter: membership transitions applied by the tracker loop.
/// Labels: `from`, `to`.
pub fn state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("taskexec.tasks.state_transitions")
        .with_description("Number of task state transitions")
        .build()
}

/// Counter: lifecycle events emitted after the tracker loop exited.
/// Labels: `kind` ("started" | "completed").
pub fn events_dropped() -> Counter<u64> {
    meter()
        .u64_counter("taskexec.events.dropped")
        .with_description("Task events discarded because the tracker was gone")
        .build()
}

/// Histogram: how long a task actually ran, in milliseconds.
/// Labels: `cancelled`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskexec.task.duration_ms")
        .with_description("Task run time in milliseconds")
        .with_unit("ms")
        .build()
}
