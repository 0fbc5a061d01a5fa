//! Error types for taskexec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The work queue was full when a task was offered to it.
    #[error("queue is operating at maximum capacity")]
    CapacityExceeded,

    /// The work queue was stopped and accepts no further tasks.
    #[error("work queue is stopped")]
    Stopped,

    #[error("tracker is not running")]
    NotRunning,

    #[error("tracker is already running")]
    AlreadyRunning,

    /// The tracker loop ended because the shutdown token fired.
    #[error("tracker cancelled by shutdown")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
