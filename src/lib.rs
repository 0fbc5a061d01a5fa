//! # taskexec
//!
//! Bounded-concurrency task executor.
//!
//! Callers submit identified units of simulated work; the engine queues them
//! up to a fixed capacity, runs them on a fixed pool of workers, and tracks
//! which tasks are waiting and which are running. An HTTP layer exposes
//! submission and statistics, and OpenTelemetry covers observability.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod server;
pub mod telemetry;
