use crate::error::{Result, WatchError};
use chrono::NaiveTime;
use constant_time_eq::constant_time_eq;
use std::env;
use std::time::Duration;

/// Placeholder value shipped in sample `.env` files; treated as "not configured"
pub const SERPAPI_KEY_PLACEHOLDER: &str = "your_serpapi_key_here";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Admin credentials
    pub admin: AdminConfig,
    /// Reachability probe configuration
    pub probe: ProbeConfig,
    /// Search API configuration
    pub search: SearchConfig,
    /// Periodic sweep configuration
    pub scheduler: SchedulerConfig,
    /// Pause lengths between paced steps
    pub pacing: PacingConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 3000)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = localhost only)
    pub cors_origins: Vec<String>,
    /// JWT secret for token generation
    pub jwt_secret: String,
    /// Lifetime of an operator session in hours (default: 24)
    pub session_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    /// SSL mode (disable, require, prefer)
    pub ssl_mode: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
}

impl AdminConfig {
    /// Compare a login attempt against the operator credentials. Both fields
    /// are always compared.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = constant_time_eq(self.username.as_bytes(), username.as_bytes());
        let pass_ok = constant_time_eq(self.password.as_bytes(), password.as_bytes());
        user_ok & pass_ok
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Redirects followed before a response counts as reached
    pub max_redirects: usize,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// SerpAPI key, `None` when unset
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Default `gl` parameter
    pub default_country: String,
    /// Default `hl` parameter
    pub default_language: String,
}

impl SearchConfig {
    /// Whether the API key is present and not the sample placeholder
    pub fn has_api_key(&self) -> bool {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) => !key.is_empty() && key != SERPAPI_KEY_PLACEHOLDER,
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub block_sweep_interval: Duration,
    /// Local time of day for the daily rank sweep
    pub rank_sweep_time: NaiveTime,
}

#[derive(Debug, Clone)]
pub struct PacingConfig {
    pub between_proxies: Duration,
    pub between_windows: Duration,
    pub between_keywords: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            api: ApiServerConfig {
                port: get_env_or("API_PORT", "3000").parse().map_err(|_| {
                    WatchError::InvalidConfig("API_PORT must be a valid port number".into())
                })?,
                host: get_env_or("API_HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                jwt_secret: get_env_or("JWT_SECRET", ""),
                session_ttl_hours: get_env_or("SESSION_TTL_HOURS", "24")
                    .parse::<i64>()
                    .ok()
                    .filter(|hours| *hours > 0)
                    .ok_or_else(|| {
                        WatchError::InvalidConfig(
                            "SESSION_TTL_HOURS must be a positive number".into(),
                        )
                    })?,
            },
            database: DatabaseConfig {
                host: get_env_or("DB_HOST", "localhost"),
                port: get_env_or("DB_PORT", "5432").parse().map_err(|_| {
                    WatchError::InvalidConfig("DB_PORT must be a valid port number".into())
                })?,
                user: get_env_or("DB_USER", "postgres"),
                password: get_env_or("DB_PASSWORD", "postgres"),
                name: get_env_or("DB_NAME", "website_management"),
                ssl_mode: get_env_or("DB_SSLMODE", "disable"),
                max_connections: get_env_or("DB_MAX_CONNECTIONS", "20")
                    .parse()
                    .map_err(|_| {
                        WatchError::InvalidConfig("DB_MAX_CONNECTIONS must be a valid number".into())
                    })?,
                min_connections: get_env_or("DB_MIN_CONNECTIONS", "2").parse().map_err(|_| {
                    WatchError::InvalidConfig("DB_MIN_CONNECTIONS must be a valid number".into())
                })?,
            },
            admin: AdminConfig {
                username: get_env_or("SITEWATCH_ADMIN_USER", "admin"),
                password: get_env_or("SITEWATCH_ADMIN_PASSWORD", "admin"),
            },
            probe: ProbeConfig {
                timeout_secs: get_env_or("PROBE_TIMEOUT_SECS", "10").parse().unwrap_or(10),
                max_redirects: get_env_or("PROBE_MAX_REDIRECTS", "5").parse().unwrap_or(5),
                user_agent: get_env_or(
                    "PROBE_USER_AGENT",
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
                ),
            },
            search: SearchConfig {
                api_key: env::var("SERPAPI_KEY")
                    .or_else(|_| env::var("SERPAPI_API_KEY"))
                    .ok(),
                base_url: get_env_or("SERPAPI_BASE_URL", "https://serpapi.com/search.json"),
                timeout_secs: get_env_or("SERPAPI_TIMEOUT_SECS", "60").parse().unwrap_or(60),
                default_country: get_env_or("SEARCH_DEFAULT_COUNTRY", "vn"),
                default_language: get_env_or("SEARCH_DEFAULT_LANGUAGE", "vi"),
            },
            scheduler: SchedulerConfig {
                enabled: get_env_or("SCHEDULER_ENABLED", "true")
                    .parse()
                    .unwrap_or(true),
                block_sweep_interval: Duration::from_secs(
                    get_env_or("BLOCK_SWEEP_INTERVAL_HOURS", "6")
                        .parse::<u64>()
                        .map_err(|_| {
                            WatchError::InvalidConfig(
                                "BLOCK_SWEEP_INTERVAL_HOURS must be a valid number".into(),
                            )
                        })?
                        .max(1)
                        * 3600,
                ),
                rank_sweep_time: NaiveTime::parse_from_str(
                    &get_env_or("RANK_SWEEP_TIME", "02:00"),
                    "%H:%M",
                )
                .map_err(|_| {
                    WatchError::InvalidConfig("RANK_SWEEP_TIME must use the HH:MM format".into())
                })?,
            },
            pacing: PacingConfig {
                between_proxies: Duration::from_millis(
                    get_env_or("PACE_PROXY_MS", "1000").parse().unwrap_or(1000),
                ),
                between_windows: Duration::from_millis(
                    get_env_or("PACE_WINDOW_MS", "500").parse().unwrap_or(500),
                ),
                between_keywords: Duration::from_millis(
                    get_env_or("PACE_KEYWORD_MS", "2000").parse().unwrap_or(2000),
                ),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "json"),
            },
        })
    }

    /// Get the database connection URL
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.database.user,
            self.database.password,
            self.database.host,
            self.database.port,
            self.database.name,
            self.database.ssl_mode
        )
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
