//! Snapshot acquisition from the analytics endpoint.

use std::time::Duration;

use async_trait::async_trait;
use badgesync_core::{Error, Result, Snapshot, SyncConfig};
use tracing::{debug, info};
use url::Url;

/// Source of the current dataset.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the body of one full snapshot, exactly as served.
    async fn fetch(&self) -> Result<Vec<u8>>;
}

/// Fetcher backed by a single HTTP GET. Failures are not retried.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    url: Url,
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher for `url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the URL does not parse or the HTTP
    /// client cannot be built.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::invalid_config(format!("data_url '{url}': {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::invalid_config(format!("http client: {e}")))?;
        Ok(Self { url, client })
    }

    /// Create a fetcher from the resolved configuration.
    ///
    /// # Errors
    ///
    /// See [`HttpFetcher::new`].
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::new(&config.data_url, config.request_timeout())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self) -> Result<Vec<u8>> {
        info!(url = %self.url, "Fetching analytics data");

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::fetch(e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::fetch(e.to_string()))?;
        debug!(bytes = body.len(), "Received response body");

        Ok(body.to_vec())
    }
}

/// Fetcher returning a fixed body, or a fixed failure.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    body: Option<Vec<u8>>,
}

impl StaticFetcher {
    pub fn new(snapshot: &Snapshot) -> Self {
        Self {
            body: serde_json::to_vec(snapshot).ok(),
        }
    }

    /// Serve `body` verbatim.
    pub fn from_body(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: Some(body.into()),
        }
    }

    /// A fetcher whose every fetch fails.
    pub fn failing() -> Self {
        Self { body: None }
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self) -> Result<Vec<u8>> {
        self.body
            .clone()
            .ok_or_else(|| Error::fetch("endpoint unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_url() {
        let result = HttpFetcher::new("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_from_default_config() {
        let fetcher = HttpFetcher::from_config(&SyncConfig::default());
        assert_eq!(
            fetcher.ok().map(|f| f.url().host_str().map(str::to_string)),
            Some(Some("analytics.home-assistant.io".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fetch_error() {
        // Nothing listens on the discard port.
        let fetcher = HttpFetcher::new("http://127.0.0.1:9/data.json", Duration::from_secs(2));
        let result = match fetcher {
            Ok(fetcher) => fetcher.fetch().await,
            Err(e) => Err(e),
        };
        assert!(matches!(result, Err(Error::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_static_fetcher_serves_body_verbatim() {
        let body = br#"{"foo":{"total":-1}}"#;
        let served = StaticFetcher::from_body(body.to_vec()).fetch().await;
        assert_eq!(served.ok().as_deref(), Some(body.as_slice()));
        assert!(StaticFetcher::failing().fetch().await.is_err());
    }
}
