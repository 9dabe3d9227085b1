//! Crawlgate: the fetch engine under a two-site content crawler
//!
//! Every network fetch the crawler makes goes through this crate. It bounds
//! global and per-host concurrency, retries transient failures with backoff,
//! and supervises the population of in-flight crawl tasks.

pub mod admission;
pub mod config;
pub mod fetch;
pub mod supervisor;
pub mod url;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for crawlgate operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Malformed JSON from {url}: {message}")]
    MalformedJson { url: String, message: String },

    #[error("Unexpected content type from {url}: {content_type:?}")]
    ContentType { url: String, content_type: String },

    #[error("Assertion about JSON not satisfied at {url}: {key:?} = {expected} (got {actual})")]
    AssertionMismatch {
        url: String,
        key: String,
        expected: serde_json::Value,
        actual: serde_json::Value,
    },

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Supervisor shut down: {reason}")]
    SupervisorShutdown { reason: ShutdownReason },

    #[error("Task cancelled")]
    Cancelled,

    #[error("Task {id} panicked")]
    TaskPanicked { id: u64 },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Usage error: {0}")]
    Usage(String),
}

/// Coarse classification of a [`CrawlError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TransientNetwork,
    MalformedResponse,
    AssertionMismatch,
    Filesystem,
    SupervisorShutdown,
    Cancelled,
    Timeout,
    Usage,
    Internal,
}

/// Why a supervisor refused or cancelled a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownReason {
    /// The supervisor was closed explicitly or by an earlier limit breach
    Closed,
    /// The supervisor outlived its configured lifetime
    LifetimeExceeded,
    /// More tasks settled than the configured volume
    VolumeExceeded,
    /// More tasks alive than the configured width
    WidthExceeded,
    /// The task did not settle before the close timeout
    Straggler,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Closed => "supervisor closed",
            Self::LifetimeExceeded => "lifetime exceeded",
            Self::VolumeExceeded => "volume exceeded",
            Self::WidthExceeded => "width exceeded",
            Self::Straggler => "task did not settle before close timeout",
        };
        f.write_str(s)
    }
}

impl CrawlError {
    /// Returns the classified kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http { .. } => ErrorKind::TransientNetwork,
            Self::MalformedJson { .. } | Self::ContentType { .. } => ErrorKind::MalformedResponse,
            Self::AssertionMismatch { .. } => ErrorKind::AssertionMismatch,
            Self::Filesystem { .. } => ErrorKind::Filesystem,
            Self::SupervisorShutdown { .. } => ErrorKind::SupervisorShutdown,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Usage(_) | Self::Url(_) | Self::Config(_) => ErrorKind::Usage,
            Self::TaskPanicked { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if a fetch failing with this error should be attempted again
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientNetwork | ErrorKind::MalformedResponse | ErrorKind::AssertionMismatch
        )
    }

    /// Returns true if the supervisor, not the work itself, stopped the task
    pub fn is_supervisor_shutdown(&self) -> bool {
        matches!(self, Self::SupervisorShutdown { .. })
    }

    pub(crate) fn http(url: &::url::Url, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL {url:?}: {source}")]
    Parse {
        url: String,
        source: ::url::ParseError,
    },

    #[error("Missing host in URL: {0}")]
    MissingHost(String),
}

/// Result type alias for crawlgate operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use admission::{AdmissionController, AdmissionLimits, AdmissionPermit};
pub use config::Config;
pub use fetch::{Download, DownloadOptions, Fetcher, JsonExpectations, RetryPolicy, ScopedResponse};
pub use supervisor::{SupervisorLimits, TaskHandle, TaskState, TaskSupervisor};
