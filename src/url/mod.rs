//! URL handling module for crawlgate
//!
//! This module provides URL parsing, the host key used for per-host
//! admission, and filename derivation for streaming downloads.

mod domain;
mod filename;

use crate::UrlError;
use url::Url;

// Re-export main functions
pub use domain::host_key;
pub use filename::{
    default_file_name, disambiguate, is_usable_file_name, sanitize_file_name, DEFAULT_FILE_NAME,
};

/// Parses a URL string, keeping the offending input in the error
///
/// # Examples
///
/// ```
/// use crawlgate::url::parse_url;
///
/// assert!(parse_url("https://m.weibo.cn/status/4180192106660800").is_ok());
/// assert!(parse_url("not a url").is_err());
/// ```
pub fn parse_url(url_str: &str) -> Result<Url, UrlError> {
    Url::parse(url_str).map_err(|source| UrlError::Parse {
        url: url_str.to_string(),
        source,
    })
}
