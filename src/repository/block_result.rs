use crate::error::Result;
use crate::models::{NewProbeResult, ProbeResult};
use sqlx::PgPool;
use tracing::debug;

/// Repository for the append-only probe result log
#[derive(Clone)]
pub struct BlockResultRepository {
    pool: PgPool,
}

impl BlockResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one probe result
    pub async fn insert(&self, result: &NewProbeResult) -> Result<ProbeResult> {
        let row = sqlx::query_as::<_, ProbeResult>(
            r#"
            INSERT INTO website_block_status (website_id, isp_name, status, http_code, error_message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, website_id, isp_name, status, http_code, error_message, checked_at
            "#,
        )
        .bind(result.website_id)
        .bind(&result.isp_name)
        .bind(result.classification.status.as_str())
        .bind(result.classification.http_code.map(i32::from))
        .bind(&result.classification.error_message)
        .fetch_one(&self.pool)
        .await?;

        debug!(
            website_id = row.website_id,
            isp = %row.isp_name,
            status = %row.status,
            "Recorded probe result"
        );
        Ok(row)
    }

    /// Most recent results for a site, newest first
    pub async fn recent_for_site(&self, website_id: i32, limit: i64) -> Result<Vec<ProbeResult>> {
        let rows = sqlx::query_as::<_, ProbeResult>(
            r#"
            SELECT id, website_id, isp_name, status, http_code, error_message, checked_at
            FROM website_block_status
            WHERE website_id = $1
            ORDER BY checked_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(website_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Latest result per ISP for a site
    pub async fn latest_per_isp(&self, website_id: i32) -> Result<Vec<ProbeResult>> {
        let rows = sqlx::query_as::<_, ProbeResult>(
            r#"
            SELECT DISTINCT ON (isp_name)
                   id, website_id, isp_name, status, http_code, error_message, checked_at
            FROM website_block_status
            WHERE website_id = $1
            ORDER BY isp_name, checked_at DESC, id DESC
            "#,
        )
        .bind(website_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
