use crate::error::Result;
use crate::models::{NewRankRecord, RankRecord};
use sqlx::PgPool;

/// Repository for keyword rank history
#[derive(Clone)]
pub struct RankHistoryRepository {
    pool: PgPool,
}

impl RankHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &NewRankRecord) -> Result<RankRecord> {
        let row = sqlx::query_as::<_, RankRecord>(
            r#"
            INSERT INTO keyword_rank_history (website_id, keyword, position, found_url, serpapi_search_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, website_id, keyword, position, found_url, serpapi_search_id, checked_at
            "#,
        )
        .bind(record.website_id)
        .bind(&record.keyword)
        .bind(record.position)
        .bind(&record.found_url)
        .bind(&record.search_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Rank history for a site, newest first
    pub async fn for_site(&self, website_id: i32, limit: i64) -> Result<Vec<RankRecord>> {
        let rows = sqlx::query_as::<_, RankRecord>(
            r#"
            SELECT id, website_id, keyword, position, found_url, serpapi_search_id, checked_at
            FROM keyword_rank_history
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
}
