//! Execution engine: bounded worker pool plus the admission/state tracker.

pub mod pool;
mod task;
pub mod tracker;

pub use pool::{Job, WorkerPool};
pub use tracker::Tracker;
