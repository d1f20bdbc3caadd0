use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Aggregate reachability status of a site across all ISP proxies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Active,
    Blocked,
    Error,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Active => "active",
            SiteStatus::Blocked => "blocked",
            SiteStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(SiteStatus::Active),
            "blocked" => Some(SiteStatus::Blocked),
            "error" => Some(SiteStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Monitored website
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Site {
    pub id: i32,
    pub domain: String,
    pub keyword: Option<String>,
    pub ranking: Option<i32>,
    /// Null until the first block check completes
    pub status: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Site {
    pub fn status_enum(&self) -> Option<SiteStatus> {
        self.status.as_deref().and_then(SiteStatus::from_str)
    }

    /// Trimmed keyword, `None` when missing or blank
    pub fn tracked_keyword(&self) -> Option<&str> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// Filter applied when listing sites
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteFilter {
    /// Only sites with a non-empty keyword
    pub with_keyword: bool,
}

impl SiteFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_keyword() -> Self {
        Self { with_keyword: true }
    }

    pub fn matches(&self, site: &Site) -> bool {
        !self.with_keyword || site.tracked_keyword().is_some()
    }
}
