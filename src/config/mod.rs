//! Typed configuration.
//!
//! Layered lowest to highest: built-in defaults, an optional TOML file,
//! then environment variables. The binary applies command-line flags on
//! top. Validated once at startup.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Maximum number of tasks waiting in the queue.
    pub queue_capacity: usize,
    pub host: String,
    pub port: u16,
    /// How long shutdown waits for in-flight work before aborting it.
    pub shutdown_grace_secs: u64,
    /// Upper bound on reading, handling and answering one HTTP request.
    pub request_timeout_secs: u64,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 16,
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_grace_secs: 10,
            request_timeout_secs: 15,
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Read a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let file: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad config file {}: {e}", path.display())))?;
        file.with_env()
    }

    fn with_env(mut self) -> Result<Self> {
        if let Some(workers) = parsed_var("TASKEXEC_WORKERS")? {
            self.workers = workers;
        }
        if let Some(capacity) = parsed_var("TASKEXEC_QUEUE_CAPACITY")? {
            self.queue_capacity = capacity;
        }
        if let Ok(host) = std::env::var("TASKEXEC_HOST") {
            self.host = host;
        }
        if let Some(port) = parsed_var("TASKEXEC_PORT")? {
            self.port = port;
        }
        if let Some(grace) = parsed_var("TASKEXEC_SHUTDOWN_GRACE_SECS")? {
            self.shutdown_grace_secs = grace;
        }
        if let Some(timeout) = parsed_var("TASKEXEC_REQUEST_TIMEOUT_SECS")? {
            self.request_timeout_secs = timeout;
        }
        if let Ok(endpoint) = std::env::var("OTEL_ENDPOINT") {
            self.otel_endpoint = Some(endpoint);
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}
