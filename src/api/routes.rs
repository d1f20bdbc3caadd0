//! API route definitions

use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::middleware::require_auth;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no auth required)
        .route("/health", get(handlers::health::health_check))
        // Auth routes
        .route("/api/auth/login", post(handlers::auth::login))
        // Protected routes
        .nest("/api", protected_routes())
        .with_state(state)
}

/// Routes that require authentication
fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/session", get(handlers::auth::session))
        // Block checks
        .route("/block-check/probe", post(handlers::block_check::probe))
        .route(
            "/block-check/check/:site_id",
            post(handlers::block_check::check_site),
        )
        .route(
            "/block-check/check-batch",
            post(handlers::block_check::check_batch),
        )
        .route(
            "/block-check/sites/:site_id/results",
            get(handlers::block_check::site_results),
        )
        // Rank checks
        .route("/rank/check", post(handlers::rank::check_rank))
        .route("/rank/check-many", post(handlers::rank::check_rank_many))
        .route(
            "/rank/sites/:site_id/history",
            get(handlers::rank::site_history),
        )
        // Scheduler
        .route("/scheduler/status", get(handlers::scheduler::status))
        .route(
            "/scheduler/block-sweep",
            post(handlers::scheduler::trigger_block_sweep),
        )
        .route(
            "/scheduler/rank-sweep",
            post(handlers::scheduler::trigger_rank_sweep),
        )
        .route_layer(from_fn(require_auth))
}
