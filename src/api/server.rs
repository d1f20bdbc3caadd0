//! API server using Axum
//!
//! Exposes block checks, rank checks and scheduler control to the admin
//! dashboard.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Extension, Router};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::checker::BlockOrchestrator;
use crate::config::{ApiServerConfig, Config};
use crate::database::Database;
use crate::error::{Result, WatchError};
use crate::rank::RankResolver;
use crate::repository::{ResultLog, SiteRegistry};
use crate::services::Scheduler;

use super::middleware::{cors_layer, OperatorTokens};
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: OperatorTokens,
    pub started_at: Instant,
    /// Pool used for health reporting, absent when running on another store
    pub db: Option<Database>,
    pub registry: Arc<dyn SiteRegistry>,
    pub results: Arc<dyn ResultLog>,
    pub orchestrator: Arc<BlockOrchestrator>,
    pub resolver: Arc<RankResolver>,
    pub scheduler: Arc<Scheduler>,
}

/// Build the complete router for the given state
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.api.cors_origins);
    let sessions = state.sessions.clone();

    routes::create_router(state)
        .layer(Extension(sessions))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self {
            config: state.config.api.clone(),
            state,
        }
    }

    /// Run the API server until `shutdown` flips to true
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| WatchError::InvalidConfig(format!("invalid API address: {}", e)))?;

        let router = build_router(self.state.clone());

        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| WatchError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
