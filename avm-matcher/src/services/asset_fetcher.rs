//! Asset fetch
//!
//! Retrieves raw asset bytes from a source locator. `http(s)://` locators go
//! over the network; `file://` locators and plain paths are read from disk.
//! Every call is bounded by the timeout passed in.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("avm-matcher/", env!("CARGO_PKG_VERSION"));

/// Per-asset fetch errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("Candidate has no source locator")]
    MissingLocator,

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Image decode failed: {0}")]
    Decode(String),
}

/// Asset byte source
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, locator: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// Fetcher for HTTP(S) URLs and local files
#[derive(Clone)]
pub struct HttpAssetFetcher {
    client: Client,
}

impl HttpAssetFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    async fn fetch_http(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(url = %url, "Fetching asset over HTTP");

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;
        Ok(bytes.to_vec())
    }

    async fn fetch_file(&self, path: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(path = %path, "Reading asset from disk");

        tokio::time::timeout(timeout, tokio::fs::read(path))
            .await
            .map_err(|_| FetchError::Timeout(timeout))?
            .map_err(|e| FetchError::Io(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, locator: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(FetchError::MissingLocator);
        }

        if locator.starts_with("http://") || locator.starts_with("https://") {
            self.fetch_http(locator, timeout).await
        } else if let Some(path) = locator.strip_prefix("file://") {
            self.fetch_file(path, timeout).await
        } else {
            self.fetch_file(locator, timeout).await
        }
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Network(err.to_string())
    }
}
