use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

use crate::engine::Tracker;
use crate::model::{Statistics, TaskId, batch_from_secs};

/// Every failure is reported as a 500 with the error text as body.
pub(super) struct ServerError(String);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0).into_response()
    }
}

pub(super) async fn submit_tasks(
    State(tracker): State<Arc<Tracker>>,
    body: Bytes,
) -> Result<StatusCode, ServerError> {
    let tasks: BTreeMap<TaskId, u64> = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "error decoding task submission");
        ServerError(e.to_string())
    })?;

    tracker
        .submit_batch(&batch_from_secs(tasks))
        .map_err(|e| {
            error!(error = %e, "failed to submit tasks");
            ServerError(e.to_string())
        })?;

    Ok(StatusCode::OK)
}

pub(super) async fn task_statistics(State(tracker): State<Arc<Tracker>>) -> Json<Statistics> {
    Json(tracker.statistics())
}
