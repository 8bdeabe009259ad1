use async_trait::async_trait;
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

use super::parser::{parse_feed, Entry, ParsedFeed};
use crate::util::validate_url;

const MAX_RETRIES: u32 = 3;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while fetching a feed.
///
/// During polling these are logged per feed and the feed is retried on the
/// next cycle; at subscribe time they surface as an invalid feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the fetch timeout
    #[error("Request timed out")]
    Timeout,
    /// Body could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Parsed document has no feed-level link
    #[error("Not a valid feed: no feed link")]
    MissingLink,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// A successfully fetched and parsed feed.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    /// URL after following redirects; the canonical feed identity
    pub final_url: String,
    pub title: Option<String>,
    pub link: String,
    /// Newest first
    pub entries: Vec<Entry>,
}

impl FetchedFeed {
    /// Title shown to recipients, falling back to the feed link
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.link)
    }
}

const MAX_REDIRECTS: usize = 5;

fn redirect_policy(allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        // A public feed must not bounce the bot into its own network
        if let Err(e) = validate_url(url.as_str(), allow_private_hosts) {
            return attempt.error(e);
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// HTTP client shared by the feed fetcher and the Bot API client
pub fn http_client(allow_private_hosts: bool) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .redirect(redirect_policy(allow_private_hosts))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
}

/// Retrieves feeds by URL.
#[async_trait]
pub trait FeedFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed, FetchError>;
}

/// HTTP fetcher backed by `reqwest` and `feed-rs`.
#[derive(Clone)]
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    max_retries: u32,
    timeout: Duration,
}

impl HttpFeedFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_retries: MAX_RETRIES,
            timeout: FETCH_TIMEOUT,
        }
    }

    /// Retries for 429, 5xx and truncated bodies (exponential backoff 1s, 2s, 4s...)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_bytes(&self, url: &str) -> Result<(String, Vec<u8>), FetchError> {
        let mut retry_count = 0;

        loop {
            let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(FetchError::Network)?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if retry_count >= self.max_retries {
                    return Err(FetchError::RateLimited(self.max_retries));
                }

                let delay_secs = 2u64.pow(retry_count);
                tracing::warn!(
                    feed = %url,
                    retry = retry_count,
                    delay_secs = delay_secs,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
                continue;
            }

            if response.status().is_server_error() {
                if retry_count >= self.max_retries {
                    return Err(FetchError::HttpStatus(response.status().as_u16()));
                }

                let delay_secs = 2u64.pow(retry_count);
                tracing::warn!(
                    feed = %url,
                    status = %response.status(),
                    retry = retry_count,
                    delay_secs = delay_secs,
                    "Server error, retrying after delay"
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
                continue;
            }

            // 4xx fail immediately
            if !response.status().is_success() {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }

            let final_url = response.url().to_string();

            match read_limited_bytes(response, MAX_FEED_SIZE).await {
                Ok(bytes) => return Ok((final_url, bytes)),
                Err(FetchError::IncompleteResponse { expected, received }) => {
                    if retry_count >= self.max_retries {
                        return Err(FetchError::IncompleteResponse { expected, received });
                    }

                    let delay_secs = 2u64.pow(retry_count);
                    tracing::debug!(
                        feed = %url,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        "Retrying incomplete download"
                    );
                    tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed, FetchError> {
        let (final_url, bytes) = self.fetch_bytes(url).await?;

        let ParsedFeed {
            title,
            link,
            entries,
        } = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
        let link = link.ok_or(FetchError::MissingLink)?;

        if final_url != url {
            tracing::debug!(feed = %url, final_url = %final_url, "Feed redirected");
        }

        Ok(FetchedFeed {
            final_url,
            title,
            link,
            entries,
        })
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
