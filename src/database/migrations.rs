use crate::error::{Result, WatchError};
use sqlx::{Executor, PgPool};
use tracing::info;

/// Run all database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    create_migrations_table(pool).await?;

    for (version, name, sql) in get_migrations() {
        if !is_migration_applied(pool, version).await? {
            info!(version = version, name = name, "Applying migration");

            // Simple protocol, migrations hold several statements
            pool.execute(sql).await.map_err(WatchError::Database)?;

            record_migration(pool, version, name).await?;

            info!(version = version, name = name, "Migration applied successfully");
        }
    }

    Ok(())
}

/// Create the migrations tracking table
async fn create_migrations_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Check if a migration has been applied
async fn is_migration_applied(pool: &PgPool, version: i32) -> Result<bool> {
    let result = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM schema_migrations WHERE version = $1",
    )
    .bind(version)
    .fetch_one(pool)
    .await?;

    Ok(result > 0)
}

/// Record a migration as applied
async fn record_migration(pool: &PgPool, version: i32, name: &str) -> Result<()> {
    sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
        .bind(version)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Get all migrations in order
fn get_migrations() -> Vec<(i32, &'static str, &'static str)> {
    vec![
        (1, "sites_and_proxies", MIGRATION_001_SITES_AND_PROXIES),
        (2, "block_status_log", MIGRATION_002_BLOCK_STATUS),
        (3, "keyword_rank_history", MIGRATION_003_RANK_HISTORY),
    ]
}

// Migration 1: monitored sites and ISP proxies
const MIGRATION_001_SITES_AND_PROXIES: &str = r#"
CREATE TABLE IF NOT EXISTS website (
    id SERIAL PRIMARY KEY,
    domain VARCHAR(255) NOT NULL UNIQUE,
    keyword VARCHAR(255),
    ranking INTEGER,
    status VARCHAR(50),
    note TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS proxy_isp (
    id SERIAL PRIMARY KEY,
    isp_name VARCHAR(255) NOT NULL UNIQUE,
    proxy_url TEXT,
    ip VARCHAR(255),
    port INTEGER,
    username VARCHAR(255),
    password VARCHAR(255),
    status VARCHAR(50) NOT NULL DEFAULT 'active',
    last_check TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_website_status ON website(status);
CREATE INDEX IF NOT EXISTS idx_proxy_isp_status ON proxy_isp(status);

-- Updated_at trigger
CREATE OR REPLACE FUNCTION update_updated_at_column()
RETURNS TRIGGER AS $$
BEGIN
    NEW.updated_at = NOW();
    RETURN NEW;
END;
$$ language 'plpgsql';

DROP TRIGGER IF EXISTS update_website_updated_at ON website;
CREATE TRIGGER update_website_updated_at
    BEFORE UPDATE ON website
    FOR EACH ROW
    EXECUTE FUNCTION update_updated_at_column();

DROP TRIGGER IF EXISTS update_proxy_isp_updated_at ON proxy_isp;
CREATE TRIGGER update_proxy_isp_updated_at
    BEFORE UPDATE ON proxy_isp
    FOR EACH ROW
    EXECUTE FUNCTION update_updated_at_column();
"#;

// Migration 2: append-only probe results
const MIGRATION_002_BLOCK_STATUS: &str = r#"
CREATE TABLE IF NOT EXISTS website_block_status (
    id SERIAL PRIMARY KEY,
    website_id INTEGER NOT NULL REFERENCES website(id) ON DELETE CASCADE,
    isp_name VARCHAR(255) NOT NULL,
    status VARCHAR(50) NOT NULL,
    http_code INTEGER,
    error_message TEXT,
    checked_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT website_block_status_status_check CHECK (
        status IN ('OK', 'BLOCK_HTTP', 'BLOCK_HTTPS', 'BLOCK_DNS', 'BLOCK_UNKNOWN', 'ERROR')
    )
);

CREATE INDEX IF NOT EXISTS idx_website_block_status_website_id ON website_block_status(website_id);
CREATE INDEX IF NOT EXISTS idx_website_block_status_checked_at ON website_block_status(checked_at DESC);
"#;

// Migration 3: rank check history
const MIGRATION_003_RANK_HISTORY: &str = r#"
CREATE TABLE IF NOT EXISTS keyword_rank_history (
    id SERIAL PRIMARY KEY,
    website_id INTEGER NOT NULL REFERENCES website(id) ON DELETE CASCADE,
    keyword VARCHAR(255) NOT NULL,
    position INTEGER,
    found_url TEXT,
    serpapi_search_id VARCHAR(255),
    checked_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_keyword_rank_history_website_id ON keyword_rank_history(website_id, checked_at DESC);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered_and_unique() {
        let migrations = get_migrations();
        let versions: Vec<i32> = migrations.iter().map(|(v, _, _)| *v).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_block_status_check_lists_every_wire_status() {
        use crate::models::BlockStatus;

        for status in [
            BlockStatus::Ok,
            BlockStatus::BlockHttp,
            BlockStatus::BlockHttps,
            BlockStatus::BlockDns,
            BlockStatus::BlockUnknown,
            BlockStatus::Error,
        ] {
            let quoted = format!("'{}'", status.as_str());
            assert!(MIGRATION_002_BLOCK_STATUS.contains(&quoted));
        }
    }
}
