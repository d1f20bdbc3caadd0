//! Search API client (SerpAPI Google engine)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error};

use super::matcher::OrganicResult;
use crate::config::SearchConfig;
use crate::error::{Result, WatchError};
use crate::models::RankWindow;

/// Message surfaced when the account is out of search credits
pub const QUOTA_EXHAUSTED_MESSAGE: &str = "Insufficient credits. Free plan includes 250 searches/month. Check usage at https://serpapi.com/dashboard";

const NO_RESPONSE_MESSAGE: &str =
    "No response from SerpAPI. Please check your internet connection.";

/// One windowed search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub keyword: String,
    pub country: String,
    pub language: String,
    pub window: RankWindow,
}

/// Parsed page of organic results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub organic_results: Vec<OrganicResult>,
    pub search_id: Option<String>,
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Whether credentials are present
    fn is_configured(&self) -> bool;

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage>;
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    search_metadata: Option<SearchMetadata>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchMetadata {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    google_job_id: Option<String>,
}

/// SerpAPI client over `reqwest`
#[derive(Clone)]
pub struct SerpApiClient {
    client: Client,
    config: SearchConfig,
}

impl SerpApiClient {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| WatchError::Internal(format!("Failed to build search client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl SearchClient for SerpApiClient {
    fn is_configured(&self) -> bool {
        self.config.has_api_key()
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if self.is_configured() => key.trim(),
            _ => return Err(WatchError::SearchNotConfigured),
        };

        debug!(
            keyword = %query.keyword,
            gl = %query.country,
            hl = %query.language,
            start = query.window.start,
            num = query.window.count,
            "Searching keyword"
        );

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&query_params(query, api_key))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Search request failed");
                WatchError::SearchApi(NO_RESPONSE_MESSAGE.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(error = %e, "Failed to read search response");
            WatchError::SearchApi(NO_RESPONSE_MESSAGE.to_string())
        })?;

        let page = parse_response(status, &body)?;
        debug!(
            keyword = %query.keyword,
            results = page.organic_results.len(),
            "Search page received"
        );
        Ok(page)
    }
}

fn query_params(query: &SearchQuery, api_key: &str) -> Vec<(&'static str, String)> {
    vec![
        ("engine", "google".to_string()),
        ("q", query.keyword.clone()),
        ("api_key", api_key.to_string()),
        ("gl", query.country.clone()),
        ("hl", query.language.clone()),
        ("num", query.window.count.to_string()),
        ("start", query.window.start.to_string()),
    ]
}

/// Interpret a search API response. A top-level `error` wins over the HTTP
/// status.
fn parse_response(status: StatusCode, body: &str) -> Result<SearchPage> {
    let parsed: Option<SerpResponse> = serde_json::from_str(body).ok();

    if let Some(message) = parsed.as_ref().and_then(|r| r.error.as_deref()) {
        error!(error = %message, "Search API returned an error");
        return Err(api_error(message));
    }

    if !status.is_success() {
        let message = match status.canonical_reason() {
            Some(reason) => format!("HTTP {}: {}", status.as_u16(), reason),
            None => format!("HTTP {}", status.as_u16()),
        };
        return Err(WatchError::SearchApi(message));
    }

    let response = parsed
        .ok_or_else(|| WatchError::SearchApi("Malformed response body".to_string()))?;

    let search_id = response
        .search_metadata
        .and_then(|m| m.id.or(m.google_job_id));

    Ok(SearchPage {
        organic_results: response.organic_results,
        search_id,
    })
}

/// Quota exhaustion is detected by the error text
pub fn api_error(message: &str) -> WatchError {
    let lowered = message.to_lowercase();
    if lowered.contains("insufficient") || lowered.contains("credits") {
        WatchError::SearchQuotaExhausted(QUOTA_EXHAUSTED_MESSAGE.to_string())
    } else {
        WatchError::SearchApi(message.to_string())
    }
}
