//! HTTP fetcher for the registry's studies endpoint.
//!
//! [`RegistryClient`] issues one bounded-retry GET per page. Exhausting the
//! retry budget yields [`FetchError::Exhausted`] so the caller can stop
//! gracefully with what it already has.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, instrument, warn};
use url::Url;

use super::error::FetchError;
use super::query::StudyQuery;
use super::record::Page;
use super::retry::{Delay, RetryDecision, RetryPolicy, TokioDelay};

/// Public studies endpoint (API v2).
pub const DEFAULT_BASE_URL: &str = "https://clinicaltrials.gov/api/v2/studies";

/// Default per-attempt request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("ctgov-ingest/", env!("CARGO_PKG_VERSION"));

/// A source of result pages addressed by continuation token.
///
/// `None` requests the first page.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches one page.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the page could not be obtained.
    async fn fetch_page(&self, page_token: Option<&str>) -> Result<Page, FetchError>;

    /// Page size requested per call, used for progress estimates.
    fn page_size(&self) -> u32;
}

/// Registry HTTP client with bounded retry.
///
/// Created once per run and reused for every page to benefit from
/// connection pooling.
#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
    base_url: Url,
    query: StudyQuery,
    retry: RetryPolicy,
    delay: Arc<dyn Delay>,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("base_url", &self.base_url.as_str())
            .field("query", &self.query)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RegistryClient {
    /// Creates a client with the given per-attempt timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: Url, query: StudyQuery, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|source| FetchError::Network {
                url: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base_url,
            query,
            retry: RetryPolicy::default(),
            delay: Arc::new(TokioDelay),
        })
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the delay used between attempts.
    #[must_use]
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    /// Returns the search query this client sends.
    #[must_use]
    pub fn query(&self) -> &StudyQuery {
        &self.query
    }

    fn request_url(&self, page_token: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .extend_pairs(self.query.params(page_token));
        url
    }

    /// Performs one attempt: GET, status check, JSON decode.
    async fn attempt(&self, url: Url) -> Result<Page, FetchError> {
        let endpoint = self.base_url.as_str();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::http_status(endpoint, status.as_u16(), &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(endpoint, e))?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::decode(endpoint, e.to_string()))
    }
}

#[async_trait]
impl PageSource for RegistryClient {
    #[instrument(skip(self), fields(has_token = page_token.is_some()))]
    async fn fetch_page(&self, page_token: Option<&str>) -> Result<Page, FetchError> {
        let url = self.request_url(page_token);
        let mut attempt = 1;

        loop {
            match self.attempt(url.clone()).await {
                Ok(page) => {
                    debug!(attempt, studies = page.studies.len(), "page received");
                    return Ok(page);
                }
                Err(err) => {
                    if let FetchError::HttpStatus {
                        status,
                        body_preview,
                        ..
                    } = &err
                    {
                        error!(status, attempt, body = %body_preview, "registry returned error status");
                    } else {
                        warn!(attempt, error = %err, "registry request failed");
                    }

                    match self.retry.should_retry(attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next,
                        } => {
                            debug!(delay_ms = delay.as_millis(), next_attempt = next, "backing off");
                            self.delay.sleep(delay).await;
                            attempt = next;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            error!(attempts = attempt, %reason, "giving up on page request");
                            return Err(FetchError::exhausted(attempt, err));
                        }
                    }
                }
            }
        }
    }

    fn page_size(&self) -> u32 {
        self.query.page_size()
    }
}
