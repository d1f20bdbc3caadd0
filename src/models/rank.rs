use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One paginated search request: `count` results starting after `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankWindow {
    pub start: u32,
    pub count: u32,
}

impl RankWindow {
    pub const fn new(start: u32, count: u32) -> Self {
        Self { start, count }
    }

    /// 1-based absolute position of an in-window rank
    pub fn absolute(&self, in_window_rank: u32) -> u32 {
        self.start + in_window_rank
    }
}

/// Locale sent with every search request (`gl` / `hl`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankOptions {
    pub country: String,
    pub language: String,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            country: "vn".to_string(),
            language: "vi".to_string(),
        }
    }
}

/// Result of resolving one keyword's rank for a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankOutcome {
    pub success: bool,
    pub keyword: String,
    pub domain: String,
    pub position: Option<u32>,
    pub found_url: Option<String>,
    pub search_id: Option<String>,
    pub error: Option<String>,
    /// Resolution stopped because the search API ran out of credits
    #[serde(default)]
    pub quota_exhausted: bool,
}

impl RankOutcome {
    /// Outcome for a keyword that could not be resolved at all
    pub fn failed(keyword: &str, domain: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            keyword: keyword.to_string(),
            domain: domain.to_string(),
            position: None,
            found_url: None,
            search_id: None,
            error: Some(error.into()),
            quota_exhausted: false,
        }
    }

    /// Resolution finished cleanly: either found, or searched every window
    /// without an upstream failure.
    pub fn is_conclusive(&self) -> bool {
        self.success || (!self.quota_exhausted && self.error.as_deref() == Some(NOT_FOUND_MESSAGE))
    }
}

/// Error text used when every window was searched without a hit
pub const NOT_FOUND_MESSAGE: &str = "Not found in first 50 positions";

/// Stored rank check row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RankRecord {
    pub id: i32,
    pub website_id: i32,
    pub keyword: String,
    pub position: Option<i32>,
    pub found_url: Option<String>,
    pub serpapi_search_id: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Rank check to be appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRankRecord {
    pub website_id: i32,
    pub keyword: String,
    pub position: Option<i32>,
    pub found_url: Option<String>,
    pub search_id: Option<String>,
}

impl NewRankRecord {
    pub fn from_outcome(website_id: i32, outcome: &RankOutcome) -> Self {
        Self {
            website_id,
            keyword: outcome.keyword.clone(),
            position: outcome.position.map(|p| p as i32),
            found_url: outcome.found_url.clone(),
            search_id: outcome.search_id.clone(),
        }
    }
}
