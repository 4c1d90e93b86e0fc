use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::cancel::Cancellation;
use super::parser::ParseError;

/// Default cap on a feed body: 10MB.
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024;
/// Default per-request timeout, covering connect through the last body byte.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A non-200 HTTP response.
///
/// Kept separate from decode failures so callers can tell a feed that is
/// unreachable or blocked from one that is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("http error: {status_text}")]
pub struct HttpError {
    /// Numeric status code, e.g. `404`.
    pub status: u16,
    /// Code plus reason phrase, e.g. `404 Not Found`.
    pub status_text: String,
}

impl From<reqwest::StatusCode> for HttpError {
    fn from(status: reqwest::StatusCode) -> Self {
        Self {
            status: status.as_u16(),
            status_text: status.to_string(),
        }
    }
}

/// Errors that can occur while fetching and decoding one feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL string could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Network-level error (DNS, connection, TLS, body read, transport timeout)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with a status other than 200
    #[error(transparent)]
    Http(#[from] HttpError),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// The batch was cancelled explicitly
    #[error("operation cancelled")]
    Cancelled,
    /// The batch deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    /// The body could not be decoded as a supported feed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

impl FetchError {
    /// True for errors raised by the cancellation token rather than the feed.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FetchError::Cancelled | FetchError::DeadlineExceeded)
    }
}

/// Settings used to build a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub request_timeout: Duration,
    pub max_feed_size: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_feed_size: DEFAULT_MAX_FEED_SIZE,
        }
    }
}

/// Performs single HTTP GETs for feed bodies.
///
/// The client is an explicit value: build one from [`FetcherConfig`] or hand
/// in a preconfigured [`reqwest::Client`] via [`Fetcher::with_client`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_feed_size: usize,
}

impl Fetcher {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the TLS backend or resolver cannot
    /// be initialized.
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config.max_feed_size))
    }

    /// Wraps a preconfigured client, e.g. one with a proxy or custom TLS roots.
    ///
    /// # Arguments
    ///
    /// * `client` - Client used for every request; its own timeouts apply
    /// * `max_feed_size` - Largest body accepted, in bytes
    pub fn with_client(client: reqwest::Client, max_feed_size: usize) -> Self {
        Self {
            client,
            max_feed_size,
        }
    }

    /// Fetches `url` and returns the full response body.
    ///
    /// The request and the body read both race `cancel`; when it fires the
    /// in-flight request is dropped, which releases the connection.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - `url` is not a valid absolute URL
    /// - [`FetchError::Network`] - connection, TLS or body read failure
    /// - [`FetchError::Http`] - any status other than 200
    /// - [`FetchError::ResponseTooLarge`] - body exceeded the size cap
    /// - [`FetchError::Cancelled`] / [`FetchError::DeadlineExceeded`]
    pub async fn fetch(&self, url: &str, cancel: &Cancellation) -> Result<Vec<u8>, FetchError> {
        if let Some(err) = cancel.error() {
            return Err(err);
        }

        let parsed = Url::parse(url)?;
        tracing::trace!(url = url, "Fetching feed");

        tokio::select! {
            biased;
            reason = cancel.done() => {
                tracing::debug!(url = url, error = %reason, "Fetch aborted");
                Err(reason)
            }
            result = self.get(parsed) => result,
        }
    }

    async fn get(&self, url: Url) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(HttpError::from(response.status()).into());
        }

        read_limited_bytes(response, self.max_feed_size).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
