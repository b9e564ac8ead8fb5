//! Page fetch collaborator.

use crate::error::FetchError;
use crate::models::Snapshot;
use crate::services::html::{parse_page, ExtractLimits};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Retrieves a page and turns it into a [`Snapshot`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Snapshot, FetchError>;
}

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub limits: ExtractLimits,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            user_agent: concat!("sitescout/", env!("CARGO_PKG_VERSION")).to_string(),
            limits: ExtractLimits::default(),
        }
    }
}

/// Fetches pages over HTTP(S) with reqwest.
pub struct HttpFetcher {
    config: FetcherConfig,
    http_client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }
}

/// Accept only absolute http(s) URLs.
pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" if parsed.host().is_some() => Ok(parsed),
        scheme => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            message: format!("unsupported scheme '{}'", scheme),
        }),
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Snapshot, FetchError> {
        let target = validate_url(url)?;
        let started = Instant::now();

        let response = self
            .http_client
            .get(target.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    FetchError::Request {
                        url: url.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            message: format!("failed to read body: {}", e),
        })?;
        let load_time = started.elapsed().as_secs_f64();

        debug!(
            url = %final_url,
            status,
            bytes = body.len(),
            load_time,
            "page_fetched"
        );

        Ok(parse_page(
            &final_url,
            status,
            &body,
            load_time,
            self.config.limits,
        ))
    }
}
