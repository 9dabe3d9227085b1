//! Integration tests for crawlgate
//!
//! These tests use wiremock to stand up local HTTP servers and drive the
//! fetcher, admission controller and supervisor end-to-end.

mod download_tests;
mod fetch_tests;
mod supervisor_tests;

use crawlgate::{AdmissionController, AdmissionLimits, Fetcher, RetryPolicy};
use std::path::Path;
use std::time::Duration;

/// Creates a fetcher with short backoff so retry tests finish quickly
pub fn test_fetcher(attempts: u32, download_dir: &Path) -> Fetcher {
    Fetcher::new(
        reqwest::Client::new(),
        AdmissionController::new(AdmissionLimits::new(Some(4), Some(2))),
        RetryPolicy::new(attempts, Duration::from_millis(10)),
        download_dir,
    )
}
