use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::SiteStatus;

/// Per-proxy block classification. The wire names are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "BLOCK_HTTP")]
    BlockHttp,
    #[serde(rename = "BLOCK_HTTPS")]
    BlockHttps,
    #[serde(rename = "BLOCK_DNS")]
    BlockDns,
    #[serde(rename = "BLOCK_UNKNOWN")]
    BlockUnknown,
    #[serde(rename = "ERROR")]
    Error,
}

impl BlockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::Ok => "OK",
            BlockStatus::BlockHttp => "BLOCK_HTTP",
            BlockStatus::BlockHttps => "BLOCK_HTTPS",
            BlockStatus::BlockDns => "BLOCK_DNS",
            BlockStatus::BlockUnknown => "BLOCK_UNKNOWN",
            BlockStatus::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OK" => Some(BlockStatus::Ok),
            "BLOCK_HTTP" => Some(BlockStatus::BlockHttp),
            "BLOCK_HTTPS" => Some(BlockStatus::BlockHttps),
            "BLOCK_DNS" => Some(BlockStatus::BlockDns),
            "BLOCK_UNKNOWN" => Some(BlockStatus::BlockUnknown),
            "ERROR" => Some(BlockStatus::Error),
            _ => None,
        }
    }

    /// Any of the `BLOCK_*` statuses
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            BlockStatus::BlockHttp
                | BlockStatus::BlockHttps
                | BlockStatus::BlockDns
                | BlockStatus::BlockUnknown
        )
    }
}

impl std::fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of classifying one proxy×domain probe pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub status: BlockStatus,
    pub http_code: Option<u16>,
    pub error_message: Option<String>,
}

impl Classification {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: BlockStatus::Error,
            http_code: None,
            error_message: Some(message.into()),
        }
    }
}

/// Stored probe result row (append-only)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProbeResult {
    pub id: i32,
    pub website_id: i32,
    pub isp_name: String,
    pub status: String, // Stored as string in DB
    pub http_code: Option<i32>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn status_enum(&self) -> Option<BlockStatus> {
        BlockStatus::from_str(&self.status)
    }
}

/// Probe result to be appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProbeResult {
    pub website_id: i32,
    pub isp_name: String,
    pub classification: Classification,
}

/// One proxy's contribution to a site check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IspCheck {
    pub isp: String,
    #[serde(flatten)]
    pub classification: Classification,
}

impl IspCheck {
    pub fn status(&self) -> BlockStatus {
        self.classification.status
    }
}

/// Aggregated result of checking one site through every active proxy
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteCheckReport {
    pub site_id: i32,
    pub domain: String,
    pub status: SiteStatus,
    pub results: Vec<IspCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SiteCheckReport {
    /// Report for a site whose check could not complete
    pub fn failed(site_id: i32, domain: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            site_id,
            domain: domain.into(),
            status: SiteStatus::Error,
            results: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Site status derived from per-proxy results: any block wins, then any error.
pub fn aggregate_site_status<'a, I>(statuses: I) -> SiteStatus
where
    I: IntoIterator<Item = &'a BlockStatus>,
{
    let mut has_error = false;
    for status in statuses {
        if status.is_block() {
            return SiteStatus::Blocked;
        }
        if *status == BlockStatus::Error {
            has_error = true;
        }
    }

    if has_error {
        SiteStatus::Error
    } else {
        SiteStatus::Active
    }
}
