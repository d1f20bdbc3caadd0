//! Rank check handlers

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::api::server::AppState;
use crate::error::{Result, WatchError};
use crate::models::RankOptions;

const DEFAULT_HISTORY_LIMIT: i64 = 30;
const MAX_HISTORY_LIMIT: i64 = 365;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankCheckRequest {
    pub keyword: String,
    pub domain: String,
    pub target_url: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankCheckManyRequest {
    pub keywords: Vec<String>,
    pub domain: String,
    pub target_url: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// Locale from the request, falling back to the configured defaults
fn options_for(state: &AppState, country: Option<String>, language: Option<String>) -> RankOptions {
    let defaults = state.resolver.default_options();
    RankOptions {
        country: country
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| defaults.country.clone()),
        language: language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| defaults.language.clone()),
    }
}

/// Resolve one keyword's position for a domain
pub async fn check_rank(
    State(state): State<AppState>,
    Json(req): Json<RankCheckRequest>,
) -> Result<impl IntoResponse> {
    let options = options_for(&state, req.country, req.language);
    let outcome = state
        .resolver
        .resolve_rank(&req.keyword, &req.domain, req.target_url.as_deref(), &options)
        .await?;

    Ok(Json(outcome))
}

/// Resolve several keywords for the same domain
pub async fn check_rank_many(
    State(state): State<AppState>,
    Json(req): Json<RankCheckManyRequest>,
) -> Result<impl IntoResponse> {
    if !state.resolver.is_configured() {
        return Err(WatchError::SearchNotConfigured);
    }

    let options = options_for(&state, req.country, req.language);
    let outcomes = state
        .resolver
        .resolve_rank_many(&req.keywords, &req.domain, req.target_url.as_deref(), &options)
        .await?;

    let found = outcomes.iter().filter(|o| o.success).count();
    Ok(Json(json!({
        "success": true,
        "total": outcomes.len(),
        "found": found,
        "results": outcomes,
    })))
}

/// Stored rank checks for a site, newest first
pub async fn site_history(
    State(state): State<AppState>,
    Path(site_id): Path<i32>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse> {
    if state.registry.get_site(site_id).await?.is_none() {
        return Err(WatchError::SiteNotFound { id: site_id });
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let history = state.results.rank_history(site_id, limit).await?;

    Ok(Json(json!({
        "success": true,
        "siteId": site_id,
        "history": history,
    })))
}
