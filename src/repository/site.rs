use crate::error::Result;
use crate::models::{Site, SiteFilter, SiteStatus};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

const SITE_COLUMNS: &str =
    "id, domain, keyword, ranking, status, note, created_at, updated_at";

/// Repository for monitored websites
#[derive(Clone)]
pub struct SiteRepository {
    pool: PgPool,
}

impl SiteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a site by ID
    pub async fn get_by_id(&self, id: i32) -> Result<Option<Site>> {
        let site = sqlx::query_as::<_, Site>(&format!(
            "SELECT {} FROM website WHERE id = $1",
            SITE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(site)
    }

    /// List sites ordered by ID
    pub async fn list(&self, filter: SiteFilter) -> Result<Vec<Site>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM website WHERE 1=1",
            SITE_COLUMNS
        ));

        if filter.with_keyword {
            query.push(" AND keyword IS NOT NULL AND TRIM(keyword) <> ''");
        }
        query.push(" ORDER BY id");

        let sites: Vec<Site> = query.build_query_as().fetch_all(&self.pool).await?;
        Ok(sites)
    }

    /// Write the aggregate block status
    pub async fn update_status(&self, id: i32, status: SiteStatus) -> Result<()> {
        sqlx::query("UPDATE website SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        debug!(id, status = %status, "Updated site status");
        Ok(())
    }

    /// Write the latest known ranking, `None` when not found
    pub async fn update_ranking(&self, id: i32, ranking: Option<i32>) -> Result<()> {
        sqlx::query("UPDATE website SET ranking = $2 WHERE id = $1")
            .bind(id)
            .bind(ranking)
            .execute(&self.pool)
            .await?;

        debug!(id, ?ranking, "Updated site ranking");
        Ok(())
    }
}
