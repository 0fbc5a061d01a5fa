//! taskexec daemon: worker pool, tracker and HTTP interface.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use taskexec::config::Config;
use taskexec::engine::{Tracker, WorkerPool};
use taskexec::error::Error;
use taskexec::telemetry::{TelemetryConfig, init_telemetry};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "taskexec", about = "Bounded-concurrency task executor")]
struct Cli {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of concurrent workers
    #[arg(short = 'n', long)]
    workers: Option<usize>,
    /// Maximum number of tasks that can wait in the queue
    #[arg(short = 'q', long = "queue-size")]
    queue_capacity: Option<usize>,
    /// Host address the server binds to
    #[arg(long)]
    host: Option<String>,
    /// Port the server listens on
    #[arg(long)]
    port: Option<u16>,
    /// Seconds to wait for in-flight work on shutdown
    #[arg(long = "grace-secs")]
    shutdown_grace_secs: Option<u64>,
    /// Seconds an HTTP request may take before it is answered with 408
    #[arg(long = "request-timeout-secs")]
    request_timeout_secs: Option<u64>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::load(path)?,
            None => Config::from_env()?,
        };
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(grace) = self.shutdown_grace_secs {
            config.shutdown_grace_secs = grace;
        }
        if let Some(timeout) = self.request_timeout_secs {
            config.request_timeout_secs = timeout;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Cli::parse().into_config()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "taskexec".to_string(),
        default_level: config.log_level.clone(),
    })?;

    let shutdown = CancellationToken::new();
    tokio::spawn(forward_signals(shutdown.clone()));

    let pool = Arc::new(WorkerPool::new(config.queue_capacity)?);
    pool.spawn(config.workers);
    let tracker = Arc::new(Tracker::new(Arc::clone(&pool)));

    let tracker_loop = tokio::spawn({
        let tracker = Arc::clone(&tracker);
        let shutdown = shutdown.clone();
        async move { tracker.run(shutdown).await }
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    // Waits for the tracker loop before accepting, so early requests are not refused.
    let served = taskexec::server::serve(
        listener,
        Arc::clone(&tracker),
        config.request_timeout(),
        shutdown.clone(),
    )
    .await;
    // The server may also end on its own error; take everything else down with it.
    shutdown.cancel();

    match tracker_loop.await? {
        Err(Error::Cancelled) => info!("tracker stopped"),
        Err(e) => warn!(error = %e, "tracker exited with error"),
        Ok(()) => {}
    }

    if !pool.shutdown(config.shutdown_grace()).await {
        warn!("in-flight tasks abandoned after grace period");
    }
    info!(dropped_events = tracker.dropped_events(), "shut down");

    served?;
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn forward_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.ok();

    info!("shutdown signal received");
    shutdown.cancel();
}
