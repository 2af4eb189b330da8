//! Page fetching.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use chatscribe_shared::{ChatscribeError, FetchConfig, Result};

/// Maximum number of redirects to follow for a share link.
const MAX_REDIRECTS: usize = 5;

/// Maximum response size we consider valid (20 MB).
const MAX_RESPONSE_SIZE: u64 = 20 * 1024 * 1024;

/// User-Agent string for page requests.
const USER_AGENT: &str = concat!("Chatscribe/", env!("CARGO_PKG_VERSION"));

/// Source of raw page markup for a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET `url` and return the response body.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// [`PageFetcher`] backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher from the `[fetch]` config section.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let user_agent = config.user_agent.as_deref().unwrap_or(USER_AGENT);
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChatscribeError::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)
            .map_err(|e| ChatscribeError::Fetch(format!("invalid URL '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ChatscribeError::Fetch(format!(
                "unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| ChatscribeError::Fetch(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatscribeError::Fetch(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(ChatscribeError::Fetch(format!(
                    "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| ChatscribeError::Fetch(format!("{url}: failed to read body: {e}")))?;

        debug!(bytes = body.len(), "page fetched");
        Ok(body)
    }
}
