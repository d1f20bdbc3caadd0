use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the Sitewatch application
#[derive(Error, Debug)]
pub enum WatchError {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    // Block checking errors
    #[error("No active proxies available")]
    NoActiveProxies,

    #[error("Invalid proxy URL format: {0}")]
    InvalidProxyUrl(String),

    #[error("Unsupported proxy protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Site not found: {id}")]
    SiteNotFound { id: i32 },

    #[error("Block sweep already in progress")]
    SweepInProgress,

    // Rank checking errors
    #[error("No active keywords found")]
    NoActiveKeywords,

    #[error(
        "SERPAPI_KEY is not configured. Set SERPAPI_KEY in the environment (get a key at https://serpapi.com/)"
    )]
    SearchNotConfigured,

    #[error("{0}")]
    SearchQuotaExhausted(String),

    #[error("Search API error: {0}")]
    SearchApi(String),

    // Authentication errors
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Sitewatch operations
pub type Result<T> = std::result::Result<T, WatchError>;

impl WatchError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            WatchError::InvalidRequest(_)
            | WatchError::InvalidProxyUrl(_)
            | WatchError::UnsupportedProtocol(_)
            | WatchError::NoActiveProxies
            | WatchError::NoActiveKeywords
            | WatchError::SearchNotConfigured
            | WatchError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            WatchError::AuthenticationFailed | WatchError::JwtError(_) => StatusCode::UNAUTHORIZED,

            // 404 Not Found
            WatchError::SiteNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            WatchError::SweepInProgress => StatusCode::CONFLICT,

            // 429 Too Many Requests
            WatchError::SearchQuotaExhausted(_) => StatusCode::TOO_MANY_REQUESTS,

            // 502 Bad Gateway
            WatchError::SearchApi(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            WatchError::DatabaseConnection(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            WatchError::Database(_) | WatchError::Io(_) | WatchError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

// Implement IntoResponse for API error responses
impl IntoResponse for WatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "success": false,
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}
