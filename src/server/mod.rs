//! HTTP interface: task submission and statistics.
//!
//! `POST /tasks` takes a JSON object of id → duration in whole seconds.
//! `GET /tasks` returns the sorted waiting and running ids.

mod handlers;

use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::engine::Tracker;
use crate::error::Result;

/// Requests not answered within `request_timeout` get a 408, body read included.
pub fn router(tracker: Arc<Tracker>, request_timeout: Duration) -> Router {
    Router::new()
        .route(
            "/tasks",
            get(handlers::task_statistics).post(handlers::submit_tasks),
        )
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(tracker)
}

/// Serve on `listener` until `shutdown` fires, then drain open connections.
///
/// Connections queue on the listener until the tracker loop is live, so
/// no request ever sees [`Error::NotRunning`](crate::error::Error::NotRunning).
pub async fn serve(
    listener: TcpListener,
    tracker: Arc<Tracker>,
    request_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;

    tokio::select! {
        _ = tracker.started() => {}
        _ = shutdown.cancelled() => {
            info!(%addr, "shutdown before tracker started, not serving");
            return Ok(());
        }
    }

    info!(%addr, timeout_s = request_timeout.as_secs_f64(), "starting HTTP server");

    axum::serve(listener, router(tracker, request_timeout))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
