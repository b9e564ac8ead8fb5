//! Places lookup collaborator (Google Places text search).

use crate::error::CollaboratorError;
use crate::models::RunInput;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "places lookup";

/// A business listing returned by the places service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u64>,
}

/// Looks up business listings by free-text query.
#[async_trait]
pub trait PlacesClient: Send + Sync {
    async fn lookup(&self, query: &str, input: &RunInput) -> Result<Vec<Place>, CollaboratorError>;
}

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<TextSearchResult>,
}

#[derive(Debug, Deserialize)]
struct TextSearchResult {
    name: String,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    formatted_phone_number: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    user_ratings_total: Option<u64>,
}

impl From<TextSearchResult> for Place {
    fn from(r: TextSearchResult) -> Self {
        Place {
            name: r.name,
            address: r.formatted_address,
            phone: r.formatted_phone_number,
            rating: r.rating,
            review_count: r.user_ratings_total,
        }
    }
}

/// Google Places text-search client.
pub struct GooglePlacesClient {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl GooglePlacesClient {
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

fn decode(body: &str) -> Result<Vec<Place>, CollaboratorError> {
    let parsed: TextSearchResponse =
        serde_json::from_str(body).map_err(|e| CollaboratorError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })?;
    match parsed.status.as_str() {
        "OK" | "ZERO_RESULTS" | "" => Ok(parsed.results.into_iter().map(Place::from).collect()),
        status => Err(CollaboratorError::Unavailable {
            service: SERVICE,
            message: parsed
                .error_message
                .unwrap_or_else(|| format!("status {}", status)),
        }),
    }
}

#[async_trait]
impl PlacesClient for GooglePlacesClient {
    async fn lookup(
        &self,
        query: &str,
        input: &RunInput,
    ) -> Result<Vec<Place>, CollaboratorError> {
        let url = format!("{}/textsearch/json", self.base_url.trim_end_matches('/'));
        let language = input.language();

        let response = self
            .http_client
            .get(&url)
            .query(&[("query", query), ("language", language), ("key", self.api_key.as_str())])
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

        let body = response
            .text()
            .await
            .map_err(|e| CollaboratorError::Unavailable {
                service: SERVICE,
                message: e.to_string(),
            })?;
        decode(&body)
    }
}
