use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use tracing::debug;

use crate::config::fetch::ConfigValueGroup as FetchConfig;
use crate::error::FetchError;

/// The capability the cache calls on a double miss: produce the raw bytes for an identifier.
///
/// Implementations should not retry; a failure is reported to the caller as absence.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, identifier: &str) -> Result<Bytes, FetchError>;
}

/// Fetches identifiers as HTTP(S) URLs with a GET request.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }

    pub fn from_env() -> Result<Self, FetchError> {
        Self::new(&FetchConfig::from_env())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, identifier: &str) -> Result<Bytes, FetchError> {
        let url = Url::parse(identifier).map_err(|_| FetchError::InvalidIdentifier(identifier.to_owned()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidIdentifier(identifier.to_owned()));
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                identifier: identifier.to_owned(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(FetchError::EmptyBody(identifier.to_owned()));
        }
        debug!("fetched {identifier} ({} bytes)", body.len());
        Ok(body)
    }
}
