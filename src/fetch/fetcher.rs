//! Retrying fetch operations
//!
//! Every operation here takes one admission permit keyed by the target host
//! before its first request and holds it across all retry attempts. The
//! permit is a drop guard, so it is returned on success, on error, and when
//! the calling future is dropped mid-flight.

use crate::admission::AdmissionController;
use crate::config::Config;
use crate::fetch::client::{build_http_client, get};
use crate::fetch::json::{parse_json, JsonExpectations};
use crate::fetch::{RetryPolicy, ScopedResponse};
use crate::url::parse_url;
use crate::CrawlError;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use std::path::{Path, PathBuf};
use url::Url;

/// Fetch context owned by the crawling application
///
/// Cloning is cheap: clones share the HTTP connection pool and the
/// admission budget.
#[derive(Debug, Clone)]
pub struct Fetcher {
    pub(crate) client: Client,
    pub(crate) admission: AdmissionController,
    pub(crate) retry: RetryPolicy,
    pub(crate) download_dir: PathBuf,
}

impl Fetcher {
    pub fn new(
        client: Client,
        admission: AdmissionController,
        retry: RetryPolicy,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            admission,
            retry,
            download_dir: download_dir.into(),
        }
    }

    /// Builds the client, admission budget and retry policy from configuration
    pub fn from_config(config: &Config) -> Result<Self, CrawlError> {
        let client = build_http_client(&config.fetch)
            .map_err(|e| CrawlError::Usage(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::new(
            client,
            AdmissionController::from_config(&config.fetch),
            RetryPolicy::from_config(&config.fetch),
            config.download.directory.clone(),
        ))
    }

    /// Uses a pre-shared client, e.g. one carrying a site's cookies
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shares an existing admission budget instead of this fetcher's own
    pub fn with_admission(mut self, admission: AdmissionController) -> Self {
        self.admission = admission;
        self
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Prepares a scoped response for `url` without sending anything yet
    pub fn open(&self, url: &str, headers: Option<HeaderMap>) -> Result<ScopedResponse, CrawlError> {
        let url = parse_url(url)?;
        Ok(self.open_url(url, headers))
    }

    pub(crate) fn open_url(&self, url: Url, headers: Option<HeaderMap>) -> ScopedResponse {
        ScopedResponse::new(
            url,
            headers,
            self.client.clone(),
            self.admission.clone(),
            self.retry,
        )
    }

    /// Fetches the full body of a successful GET
    ///
    /// # Errors
    ///
    /// * `CrawlError::Url` - `url` does not parse or has no host
    /// * `CrawlError::Http` - the last attempt failed to connect, timed out,
    ///   or returned an error status
    pub async fn fetch_bytes(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
    ) -> Result<Vec<u8>, CrawlError> {
        let url = parse_url(url)?;
        let _permit = self.admission.acquire_for(&url).await?;

        let client = &self.client;
        let target = &url;
        self.retry
            .run(&url, "read response", move |_| read_bytes(client, target, headers))
            .await
    }

    /// Fetches and validates a JSON document
    ///
    /// Empty bodies, `null`, empty containers, a wrong content type (unless
    /// relaxed) and failed field assertions are all retried like network
    /// errors; once attempts run out the last of them is returned.
    pub async fn fetch_json(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        expect: &JsonExpectations,
    ) -> Result<Value, CrawlError> {
        let url = parse_url(url)?;
        let _permit = self.admission.acquire_for(&url).await?;

        let client = &self.client;
        let target = &url;
        self.retry
            .run(&url, "get JSON response", move |_| {
                read_json(client, target, headers, expect)
            })
            .await
    }

    /// Follows redirects and returns the URL the content actually lives at
    pub async fn resolve(&self, url: &str) -> Result<Url, CrawlError> {
        let mut response = self.open(url, None)?;
        let resolved = response.start().await?.url().clone();
        response.close();

        tracing::debug!(from = %url, to = %resolved, "resolved URL");
        Ok(resolved)
    }
}

async fn read_bytes(
    client: &Client,
    url: &Url,
    headers: Option<&HeaderMap>,
) -> Result<Vec<u8>, CrawlError> {
    let response = get(client, url, headers).await?;
    let body = response
        .bytes()
        .await
        .map_err(|e| CrawlError::http(url, e))?;
    Ok(body.to_vec())
}

async fn read_json(
    client: &Client,
    url: &Url,
    headers: Option<&HeaderMap>,
    expect: &JsonExpectations,
) -> Result<Value, CrawlError> {
    let response = get(client, url, headers).await?;
    expect.check_content_type(url, response.headers())?;
    let body = response
        .bytes()
        .await
        .map_err(|e| CrawlError::http(url, e))?;
    let value = parse_json(url, &body)?;
    expect.check_fields(url, &value)?;
    Ok(value)
}
