//! Operator login

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::middleware::{AuthError, Operator};
use crate::api::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub operator: String,
    pub token: String,
    /// Seconds until the token expires
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

/// Exchange the operator credentials for a session token
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    if !state.config.admin.verify(&req.username, &req.password) {
        warn!(username = %req.username, "Operator login rejected");
        return Err(AuthError::BadCredentials);
    }

    let issued = state.sessions.issue(&req.username)?;
    info!(operator = %req.username, expires_at = %issued.expires_at, "Operator logged in");

    Ok(Json(SessionResponse {
        success: true,
        operator: req.username,
        token: issued.token,
        expires_in: state.sessions.lifetime().num_seconds(),
        expires_at: issued.expires_at,
    }))
}

/// Who the current token belongs to and when it lapses
pub async fn session(operator: Operator) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "operator": operator.name,
        "expiresAt": DateTime::<Utc>::from_timestamp(operator.expires_at, 0),
    }))
}
