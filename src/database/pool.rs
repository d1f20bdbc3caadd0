use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use tracing::{info, warn};

use crate::config::{Config, DatabaseConfig};
use crate::error::{Result, WatchError};

/// Shared Postgres pool for the site registry and check history
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Snapshot reported by the health endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealth {
    pub latency_ms: u64,
    pub pool_size: u32,
    pub idle_connections: u32,
}

impl Database {
    /// Connect using the `DB_*` settings
    pub async fn new(config: &Config) -> Result<Self> {
        let db = &config.database;

        info!(
            host = %db.host,
            port = %db.port,
            database = %db.name,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .min_connections(db.min_connections.min(db.max_connections))
            .max_connections(db.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(10 * 60))
            .connect_with(connect_options(db))
            .await
            .map_err(|e| WatchError::DatabaseConnection(e.to_string()))?;

        info!("Database connection pool established");

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query
    pub async fn health_check(&self) -> Result<DatabaseHealth> {
        let start = Instant::now();
        sqlx::query("SELECT 1").execute(&self.pool).await?;

        Ok(DatabaseHealth {
            latency_ms: start.elapsed().as_millis() as u64,
            pool_size: self.pool.size(),
            idle_connections: self.pool.num_idle() as u32,
        })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        super::migrations::run_migrations(&self.pool).await
    }

    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

fn connect_options(db: &DatabaseConfig) -> PgConnectOptions {
    let ssl_mode = PgSslMode::from_str(&db.ssl_mode).unwrap_or_else(|_| {
        warn!(ssl_mode = %db.ssl_mode, "Unknown DB_SSLMODE, using prefer");
        PgSslMode::Prefer
    });

    PgConnectOptions::new()
        .host(&db.host)
        .port(db.port)
        .username(&db.user)
        .password(&db.password)
        .database(&db.name)
        .ssl_mode(ssl_mode)
}
