//! HTTP client construction and the single GET every fetch shape is built on

use crate::config::FetchConfig;
use crate::CrawlError;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The `[fetch]` configuration section
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use crawlgate::config::FetchConfig;
/// use crawlgate::fetch::build_http_client;
///
/// let client = build_http_client(&FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.read_timeout())
        .connect_timeout(config.connect_timeout())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Sends one GET and fails on a non-success status
///
/// Connection errors, timeouts and error statuses all come back as
/// `CrawlError::Http`, which the retry loop treats as transient.
pub(crate) async fn get(
    client: &Client,
    url: &Url,
    headers: Option<&HeaderMap>,
) -> Result<Response, CrawlError> {
    let mut request = client.get(url.clone());
    if let Some(headers) = headers {
        request = request.headers(headers.clone());
    }

    let response = request
        .send()
        .await
        .map_err(|e| CrawlError::http(url, e))?;

    response
        .error_for_status()
        .map_err(|e| CrawlError::http(url, e))
}
