//! Scheduler status and manual sweep triggers

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::{error, info};

use crate::api::server::AppState;
use crate::error::{Result, WatchError};

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.status())
}

/// Start a block sweep in the background. Answers 409 while one is running.
pub async fn trigger_block_sweep(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let permit = state
        .scheduler
        .block_guard()
        .try_acquire()
        .ok_or(WatchError::SweepInProgress)?;

    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        if let Err(e) = scheduler.run_block_sweep_holding(permit).await {
            error!(error = %e, "Manual block sweep failed");
        }
    });

    info!("Manual block sweep started");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "message": "Block sweep started" })),
    ))
}

/// Start a rank sweep in the background
pub async fn trigger_rank_sweep(State(state): State<AppState>) -> Result<impl IntoResponse> {
    if !state.resolver.is_configured() {
        return Err(WatchError::SearchNotConfigured);
    }

    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        if let Err(e) = scheduler.run_rank_sweep().await {
            error!(error = %e, "Manual rank sweep failed");
        }
    });

    info!("Manual rank sweep started");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "message": "Rank sweep started" })),
    ))
}
