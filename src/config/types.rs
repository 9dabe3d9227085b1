use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for crawlgate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// Network fetch behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum concurrent requests across all hosts (unbounded when absent)
    #[serde(rename = "global-limit")]
    pub global_limit: Option<usize>,

    /// Maximum concurrent requests to a single host (unbounded when absent)
    #[serde(rename = "per-host-limit")]
    pub per_host_limit: Option<usize>,

    /// Number of attempts per fetch, including the first one
    #[serde(rename = "retry-count")]
    pub retry_count: u32,

    /// Backoff unit in milliseconds; attempt `n` waits `n` units
    #[serde(rename = "backoff-step")]
    pub backoff_step: u64,

    /// Read timeout in seconds
    #[serde(rename = "read-timeout")]
    pub read_timeout: u64,

    /// Connect timeout in seconds
    #[serde(rename = "connect-timeout")]
    pub connect_timeout: u64,

    /// User agent sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            global_limit: Some(20),
            per_host_limit: None,
            retry_count: 9,
            backoff_step: 3000,
            read_timeout: 90,
            connect_timeout: 10,
            user_agent: format!("crawlgate/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchConfig {
    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

/// Streaming download destination
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory files are written to when the caller names none
    pub directory: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./downloads"),
        }
    }
}

/// Population limits for supervised crawl tasks
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Seconds after which the supervisor stops admitting tasks
    #[serde(rename = "max-lifetime")]
    pub max_lifetime: Option<u64>,

    /// Settled tasks after which the supervisor stops admitting tasks
    #[serde(rename = "max-volume")]
    pub max_volume: Option<u64>,

    /// Concurrently alive tasks above which the supervisor shuts down
    #[serde(rename = "max-width")]
    pub max_width: Option<usize>,

    /// Seconds to wait for tasks to settle on close
    #[serde(rename = "close-timeout")]
    pub close_timeout: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_lifetime: None,
            max_volume: None,
            max_width: None,
            close_timeout: 30,
        }
    }
}

impl SupervisorConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout)
    }
}
