//! Search-results lookup collaborator (SerpApi).

use crate::error::CollaboratorError;
use crate::models::RunInput;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const SERVICE: &str = "search lookup";

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub position: u32,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// Search engine results page for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub organic: Vec<SearchHit>,
    pub has_local_pack: bool,
    pub related_searches: Vec<String>,
}

/// Runs web searches for a query in a locale.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(
        &self,
        query: &str,
        input: &RunInput,
    ) -> Result<SearchResults, CollaboratorError>;
}

/// SerpApi client using the Google engine.
pub struct SerpApiClient {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl SerpApiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Unavailable {
                service: SERVICE,
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http_client,
        })
    }
}

fn decode(body: &Value) -> Result<SearchResults, CollaboratorError> {
    if let Some(error) = body.get("error").and_then(Value::as_str) {
        return Err(CollaboratorError::Unavailable {
            service: SERVICE,
            message: error.to_string(),
        });
    }

    let organic = body
        .get("organic_results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .enumerate()
                .filter_map(|(i, r)| {
                    Some(SearchHit {
                        position: r
                            .get("position")
                            .and_then(Value::as_u64)
                            .map_or(i as u32 + 1, |p| p as u32),
                        title: r.get("title")?.as_str()?.to_string(),
                        link: r.get("link")?.as_str()?.to_string(),
                        snippet: r
                            .get("snippet")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let has_local_pack = body
        .get("local_results")
        .is_some_and(|v| !v.is_null());

    let related_searches = body
        .get("related_searches")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|r| r.get("query").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(SearchResults {
        organic,
        has_local_pack,
        related_searches,
    })
}

#[async_trait]
impl SearchClient for SerpApiClient {
    async fn search(
        &self,
        query: &str,
        input: &RunInput,
    ) -> Result<SearchResults, CollaboratorError> {
        let language = input.language();
        let country = input.region().unwrap_or("us").to_lowercase();

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("hl", language),
                ("gl", country.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CollaboratorError::Unavailable {
                service: SERVICE,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Unavailable {
                service: SERVICE,
                message: format!("HTTP {}", response.status()),
            });
        }

        let body: Value = response.json().await.map_err(|e| CollaboratorError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })?;
        decode(&body)
    }
}
