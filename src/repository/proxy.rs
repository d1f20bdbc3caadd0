use crate::error::Result;
use crate::models::IspProxy;
use sqlx::PgPool;

/// Repository for ISP proxy endpoints
#[derive(Clone)]
pub struct ProxyRepository {
    pool: PgPool,
}

impl ProxyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get all active proxies, ordered by ISP label
    pub async fn get_all_active(&self) -> Result<Vec<IspProxy>> {
        let proxies = sqlx::query_as::<_, IspProxy>(
            r#"
            SELECT id, isp_name, proxy_url, ip, port, username, password, status,
                   last_check, created_at, updated_at
            FROM proxy_isp
            WHERE status = 'active'
            ORDER BY isp_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(proxies)
    }

    /// Stamp the proxy's last check time
    pub async fn touch_last_check(&self, id: i32) -> Result<()> {
        sqlx::query("UPDATE proxy_isp SET last_check = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
