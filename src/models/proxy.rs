use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;

use crate::error::{Result, WatchError};

/// Scheme of the upstream proxy a probe is routed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks5 => "socks5",
        }
    }

    pub fn from_scheme(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(ProxyProtocol::Http),
            "https" => Some(ProxyProtocol::Https),
            "socks5" | "socks5h" | "socks" => Some(ProxyProtocol::Socks5),
            _ => None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            ProxyProtocol::Http => 80,
            ProxyProtocol::Https => 443,
            ProxyProtocol::Socks5 => 1080,
        }
    }
}

impl std::fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Proxy endpoint status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    #[default]
    Active,
    Inactive,
}

impl ProxyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyStatus::Active => "active",
            ProxyStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(ProxyStatus::Active),
            "inactive" => Some(ProxyStatus::Inactive),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// ISP-labelled proxy endpoint
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IspProxy {
    pub id: i32,
    pub isp_name: String,
    #[serde(skip_serializing)]
    pub proxy_url: Option<String>,
    pub ip: Option<String>,
    pub port: Option<i32>,
    #[serde(skip_serializing)]
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub status: String, // Stored as string in DB
    pub last_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IspProxy {
    /// Get the status enum
    pub fn status_enum(&self) -> Option<ProxyStatus> {
        ProxyStatus::from_str(&self.status)
    }

    pub fn is_active(&self) -> bool {
        self.status_enum() == Some(ProxyStatus::Active)
    }

    /// Connection URL for this proxy.
    ///
    /// A stored `proxy_url` wins; otherwise one is assembled from the
    /// individual fields, which requires host, port and both credentials.
    /// Credentials are percent-encoded into the userinfo.
    pub fn connection_url(&self) -> Option<String> {
        if let Some(url) = self.proxy_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Some(url.trim().to_string());
        }

        match (&self.ip, self.port, &self.username, &self.password) {
            (Some(ip), Some(port), Some(user), Some(pass))
                if !ip.is_empty() && !user.is_empty() && !pass.is_empty() =>
            {
                assemble_url(ip, port, user, pass)
            }
            _ => None,
        }
    }

    /// Parsed connection for this proxy
    pub fn connection(&self) -> Result<ProxyConnection> {
        let url = self.connection_url().ok_or_else(|| {
            WatchError::InvalidProxyUrl(
                "Proxy URL cannot be built from provided fields".to_string(),
            )
        })?;
        ProxyConnection::parse(&url)
    }
}

/// A validated proxy URL ready to be handed to the HTTP client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConnection {
    protocol: ProxyProtocol,
    url: Url,
}

impl ProxyConnection {
    /// Parse `scheme://[user:pass@]host[:port]`
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|_| WatchError::InvalidProxyUrl(redact(raw)))?;

        let protocol = ProxyProtocol::from_scheme(url.scheme())
            .ok_or_else(|| WatchError::UnsupportedProtocol(url.scheme().to_string()))?;

        if url.host_str().map_or(true, str::is_empty) {
            return Err(WatchError::InvalidProxyUrl(redact(raw)));
        }

        Ok(Self { protocol, url })
    }

    pub fn protocol(&self) -> ProxyProtocol {
        self.protocol
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.url
            .port()
            .unwrap_or_else(|| self.protocol.default_port())
    }

    pub fn has_credentials(&self) -> bool {
        !self.url.username().is_empty()
    }

    /// Full URL including credentials
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// URL handed to the HTTP client. Bare `socks` becomes `socks5h` so the
    /// target name is resolved on the proxy side.
    pub fn client_url(&self) -> String {
        match self.url.scheme() {
            "socks" => {
                let rest = self
                    .url
                    .as_str()
                    .split_once("://")
                    .map(|(_, rest)| rest)
                    .unwrap_or_default();
                format!("socks5h://{}", rest)
            }
            _ => self.url.as_str().to_string(),
        }
    }

    /// `scheme://host:port` without credentials, for logs
    pub fn redacted(&self) -> String {
        format!("{}://{}:{}", self.url.scheme(), self.host(), self.port())
    }
}

fn assemble_url(ip: &str, port: i32, user: &str, pass: &str) -> Option<String> {
    let port = u16::try_from(port).ok()?;
    let host = if ip.contains(':') && !ip.starts_with('[') {
        format!("[{}]", ip)
    } else {
        ip.to_string()
    };

    let mut url = Url::parse(&format!("http://{}", host)).ok()?;
    url.set_port(Some(port)).ok()?;
    url.set_username(user).ok()?;
    url.set_password(Some(pass)).ok()?;

    Some(url.as_str().trim_end_matches('/').to_string())
}

/// Strip userinfo from a raw proxy string before it lands in an error message
fn redact(raw: &str) -> String {
    match raw.rsplit_once('@') {
        Some((_, host)) => format!("***@{}", host),
        None => raw.to_string(),
    }
}
