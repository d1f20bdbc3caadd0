//! Block check handlers

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::middleware::Operator;
use crate::api::server::AppState;
use crate::checker::Prober;
use crate::error::{Result, WatchError};

const DEFAULT_RESULT_LIMIT: i64 = 50;
const MAX_RESULT_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRequest {
    pub domain: String,
    pub proxy_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckBatchRequest {
    pub site_ids: Vec<i32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ResultsQuery {
    pub limit: Option<i64>,
}

/// Probe one domain through one proxy URL without recording anything
pub async fn probe(
    State(state): State<AppState>,
    Json(req): Json<ProbeRequest>,
) -> Result<impl IntoResponse> {
    let domain = req.domain.trim();
    if domain.is_empty() {
        return Err(WatchError::InvalidRequest("domain is required".to_string()));
    }
    if req.proxy_url.trim().is_empty() {
        return Err(WatchError::InvalidRequest(
            "proxyUrl is required".to_string(),
        ));
    }

    let classification = state
        .orchestrator
        .prober()
        .probe_url(domain, req.proxy_url.trim())
        .await;

    Ok(Json(json!({
        "success": true,
        "domain": domain,
        "result": classification,
    })))
}

/// Check one site through every active proxy
pub async fn check_site(
    State(state): State<AppState>,
    operator: Operator,
    Path(site_id): Path<i32>,
) -> Result<impl IntoResponse> {
    info!(site_id, operator = %operator.name, "Manual block check requested");

    let report = state.orchestrator.check_site_by_id(site_id).await?;
    Ok(Json(json!({ "success": true, "report": report })))
}

/// Check several sites one after another
pub async fn check_batch(
    State(state): State<AppState>,
    Json(req): Json<CheckBatchRequest>,
) -> Result<impl IntoResponse> {
    if req.site_ids.is_empty() {
        return Err(WatchError::InvalidRequest(
            "siteIds must not be empty".to_string(),
        ));
    }

    let reports = state.orchestrator.check_sites_by_id(&req.site_ids).await?;
    Ok(Json(json!({
        "success": true,
        "total": reports.len(),
        "reports": reports,
    })))
}

/// Recent probe results for a site plus the latest one per ISP
pub async fn site_results(
    State(state): State<AppState>,
    Path(site_id): Path<i32>,
    Query(query): Query<ResultsQuery>,
) -> Result<impl IntoResponse> {
    if state.registry.get_site(site_id).await?.is_none() {
        return Err(WatchError::SiteNotFound { id: site_id });
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_RESULT_LIMIT)
        .clamp(1, MAX_RESULT_LIMIT);

    let recent = state.results.recent_probe_results(site_id, limit).await?;
    let latest = state.results.latest_probe_results(site_id).await?;

    Ok(Json(json!({
        "success": true,
        "siteId": site_id,
        "recent": recent,
        "latest": latest,
    })))
}
