//! Sitewatch - Entry Point
//!
//! Starts the sweep scheduler and the admin API with graceful shutdown
//! support.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sitewatch::api::middleware::OperatorTokens;
use sitewatch::api::{ApiServer, AppState};
use sitewatch::checker::{BlockOrchestrator, HttpProber};
use sitewatch::config::LogConfig;
use sitewatch::models::RankOptions;
use sitewatch::pacer::Pacer;
use sitewatch::rank::{RankResolver, SerpApiClient};
use sitewatch::repository::PgStore;
use sitewatch::services::Scheduler;
use sitewatch::{Config, Database};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    init_tracing(&config.log);

    info!("Starting Sitewatch");

    let db = Database::new(&config)
        .await
        .context("failed to connect to database")?;
    info!("Connected to database");

    db.run_migrations()
        .await
        .context("failed to run database migrations")?;
    info!("Database migrations complete");

    let store = Arc::new(PgStore::new(db.pool().clone()));
    let pacer = Pacer::from_config(&config.pacing);

    let orchestrator = Arc::new(BlockOrchestrator::new(
        store.clone(),
        store.clone(),
        Arc::new(HttpProber::new(&config.probe)),
        pacer,
    ));

    let search = SerpApiClient::new(config.search.clone())
        .context("failed to build search client")?;
    let resolver = Arc::new(RankResolver::new(
        Arc::new(search),
        pacer,
        RankOptions {
            country: config.search.default_country.clone(),
            language: config.search.default_language.clone(),
        },
    ));
    if !resolver.is_configured() {
        warn!("SERPAPI_KEY is not set, rank checks are disabled");
    }

    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        store.clone(),
        orchestrator.clone(),
        resolver.clone(),
        pacer,
        config.scheduler.clone(),
    ));
    let scheduler_handle = if config.scheduler.enabled {
        scheduler.start()
    } else {
        info!("Scheduler disabled");
        None
    };

    let state = AppState {
        sessions: OperatorTokens::new(
            &config.api.jwt_secret,
            chrono::Duration::hours(config.api.session_ttl_hours),
        )
        .context("failed to set up operator sessions")?,
        config: config.clone(),
        started_at: Instant::now(),
        db: Some(db.clone()),
        registry: store.clone(),
        results: store,
        orchestrator,
        resolver,
        scheduler,
    };
    let api_server = ApiServer::new(state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(shutdown_rx).await {
            error!("API server error: {}", e);
        }
    });

    info!("API started on {}", config.api_addr());

    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler_handle {
        handle.stop().await;
    }
    if let Err(e) = api_task.await {
        error!("API task failed: {}", e);
    }

    db.close().await;
    info!("Sitewatch stopped");
    Ok(())
}

/// JSON output unless `LOG_FORMAT=pretty`. `RUST_LOG` overrides `LOG_LEVEL`.
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("sitewatch={},tower_http=debug", log.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("pretty") {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
