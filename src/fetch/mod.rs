//! Fetch module: every network read the crawler performs
//!
//! This module contains:
//! - HTTP client construction
//! - The retry/backoff discipline shared by all fetch shapes
//! - `ScopedResponse`, a response that owns its admission permit
//! - `Fetcher`, with byte, JSON and streaming-download operations

mod client;
mod download;
mod fetcher;
mod json;
mod response;
mod retry;

pub use client::build_http_client;
pub use download::{Download, DownloadOptions, CHUNK_SIZE};
pub use fetcher::Fetcher;
pub use json::JsonExpectations;
pub use response::{ResponseState, ScopedResponse};
pub use retry::RetryPolicy;
