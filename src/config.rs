//! Service configuration.
//!
//! Defaults are usable as-is; a JSON file can override any subset of fields and
//! the node binary applies CLI flags on top of that.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SERVICE_NAME: &str = "InvocationService";
pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_BACKLOG_THRESHOLD: usize = 1024;
pub const DEFAULT_DRAIN_POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub service_name: String,
    /// Number of worker tasks. Zero means requests execute inline on the
    /// receive loop.
    pub worker_count: usize,
    /// Default wait for `query()` and backlog drain. Zero waits forever.
    pub request_timeout_ms: u64,
    /// Outbound frames per member above which non-blocking-exempt callers wait.
    pub backlog_threshold: usize,
    pub drain_poll_interval_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            worker_count: DEFAULT_WORKER_COUNT,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            backlog_threshold: DEFAULT_BACKLOG_THRESHOLD,
            drain_poll_interval_ms: DEFAULT_DRAIN_POLL_INTERVAL_MS,
        }
    }
}

impl ServiceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// `None` means no deadline.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"worker_count": 0, "request_timeout_ms": 50}"#).unwrap();

        assert_eq!(config.worker_count, 0);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(50)));
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(config.backlog_threshold, DEFAULT_BACKLOG_THRESHOLD);
    }

    #[test]
    fn test_zero_timeout_means_infinite() {
        let config = ServiceConfig {
            request_timeout_ms: 0,
            ..Default::default()
        };

        assert_eq!(config.request_timeout(), None);
    }
}
