//! Configuration module for crawlgate
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; missing keys fall back to the defaults the crawler
//! has always run with.
//!
//! # Example
//!
//! ```no_run
//! use crawlgate::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawlgate.toml")).unwrap();
//! println!("Per-host limit: {:?}", config.fetch.per_host_limit);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, DownloadConfig, FetchConfig, SupervisorConfig};

// Re-export parser functions
pub use parser::{load_config, parse_config};
