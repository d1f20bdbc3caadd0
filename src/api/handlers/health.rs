//! Health check endpoint

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::api::server::AppState;

/// Liveness plus database round-trip.
///
/// Answers 503 when the database does not respond.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_secs = state.started_at.elapsed().as_secs();

    let (status, database) = match &state.db {
        Some(db) => match db.health_check().await {
            Ok(health) => (
                StatusCode::OK,
                json!({ "status": "up", "pool": health }),
            ),
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "status": "down", "error": e.to_string() }),
                )
            }
        },
        None => (StatusCode::OK, json!({ "status": "not_configured" })),
    };

    let healthy = status == StatusCode::OK;
    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "service": "sitewatch",
            "uptimeSecs": uptime_secs,
            "database": database,
            "searchConfigured": state.resolver.is_configured(),
        })),
    )
}
