//! Core data model.
//!
//! A task is a caller-named unit of simulated work. The engine never stores
//! a task as a record: it exists as an id in the membership sets and as a
//! queued or executing future.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Task identity
// ---------------------------------------------------------------------------

/// Caller-supplied task identifier.
///
/// Unique among the tasks currently waiting or running. Ordering is
/// lexicographic, which fixes the order in which a batch is admitted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A batch of tasks to admit, keyed by id.
pub type TaskBatch = BTreeMap<TaskId, Duration>;

/// Build a batch from `(id, whole seconds)` pairs, the shape used on the wire.
pub fn batch_from_secs<I, K>(tasks: I) -> TaskBatch
where
    I: IntoIterator<Item = (K, u64)>,
    K: Into<TaskId>,
{
    tasks
        .into_iter()
        .map(|(id, secs)| (id.into(), Duration::from_secs(secs)))
        .collect()
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Point-in-time view of the membership sets. Both lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub waiting: Vec<TaskId>,
    pub running: Vec<TaskId>,
}

/// What happened to a batch that was admitted without error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    /// Newly marked waiting and enqueued.
    pub accepted: Vec<TaskId>,
    /// Already waiting or running; left untouched.
    pub skipped: Vec<TaskId>,
}
