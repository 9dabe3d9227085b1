//! One admission permit bound to one in-flight response

use crate::admission::{AdmissionController, AdmissionPermit};
use crate::fetch::client::get;
use crate::fetch::RetryPolicy;
use crate::url::host_key;
use crate::CrawlError;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use url::Url;

/// Lifecycle of a [`ScopedResponse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseState {
    /// Constructed, no permit held yet
    NotStarted,
    /// Permit held, response possibly obtained
    Started,
    /// Permit and response released
    Closed,
}

/// A response handle that owns its admission permit
///
/// [`start`](Self::start) acquires the permit and performs the retried GET.
/// The permit is released by [`close`](Self::close) or, failing that, when
/// the handle is dropped, so early returns, errors and cancelled futures all
/// give the permit back.
///
/// ```no_run
/// # async fn example(fetcher: &crawlgate::Fetcher) -> crawlgate::Result<()> {
/// let mut response = fetcher.open("https://weibo.com/u/1444865141", None)?;
/// let final_url = response.start().await?.url().clone();
/// response.close();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ScopedResponse {
    url: Url,
    headers: Option<HeaderMap>,
    client: Client,
    admission: AdmissionController,
    retry: RetryPolicy,
    state: ResponseState,
    permit: Option<AdmissionPermit>,
    response: Option<Response>,
}

impl ScopedResponse {
    pub fn new(
        url: Url,
        headers: Option<HeaderMap>,
        client: Client,
        admission: AdmissionController,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            url,
            headers,
            client,
            admission,
            retry,
            state: ResponseState::NotStarted,
            permit: None,
            response: None,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    /// Acquires the permit and GETs the URL until a successful status arrives
    ///
    /// Only the status line and headers are awaited; the body is left for the
    /// caller to stream. On terminal failure the handle closes itself.
    ///
    /// # Errors
    ///
    /// * `CrawlError::Usage` - the handle was already started or closed
    /// * `CrawlError::Http` - every attempt failed; this is the last failure
    pub async fn start(&mut self) -> Result<&mut Response, CrawlError> {
        match self.state {
            ResponseState::NotStarted => {}
            ResponseState::Started => {
                return Err(CrawlError::Usage(format!(
                    "response for {} already started",
                    self.url
                )))
            }
            ResponseState::Closed => {
                return Err(CrawlError::Usage(format!(
                    "response for {} already closed",
                    self.url
                )))
            }
        }
        self.state = ResponseState::Started;

        let result = self.acquire_and_get().await;
        match result {
            Ok(response) => Ok(self.response.insert(response)),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    async fn acquire_and_get(&mut self) -> Result<Response, CrawlError> {
        let host = host_key(&self.url)?;
        self.permit = Some(self.admission.acquire(Some(&host)).await?);

        let client = &self.client;
        let url = &self.url;
        let headers = self.headers.as_ref();
        self.retry
            .run(url, "get response", move |_| get(client, url, headers))
            .await
    }

    /// The live response, if [`start`](Self::start) succeeded and the handle is open
    pub fn response_mut(&mut self) -> Option<&mut Response> {
        self.response.as_mut()
    }

    /// Releases the response and the admission permit
    ///
    /// Returns `true` on the first call and `false` on every later one.
    pub fn close(&mut self) -> bool {
        if self.state == ResponseState::Closed {
            return false;
        }

        self.response = None;
        if let Some(permit) = self.permit.take() {
            permit.release();
        }
        self.state = ResponseState::Closed;
        tracing::trace!(url = %self.url, "response closed");
        true
    }
}

impl Drop for ScopedResponse {
    fn drop(&mut self) {
        self.close();
    }
}
