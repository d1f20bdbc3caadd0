//! Persistence for sites, proxies and check results
//!
//! The checker and rank services only see the [`SiteRegistry`] and
//! [`ResultLog`] traits. [`PgStore`] implements both on top of the
//! Postgres repositories.

pub mod block_result;
pub mod proxy;
pub mod rank_history;
pub mod site;

pub use block_result::BlockResultRepository;
pub use proxy::ProxyRepository;
pub use rank_history::RankHistoryRepository;
pub use site::SiteRepository;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::{
    IspProxy, NewProbeResult, NewRankRecord, ProbeResult, RankRecord, Site, SiteFilter,
    SiteStatus,
};

/// Sites and proxies the engine works on
#[async_trait]
pub trait SiteRegistry: Send + Sync {
    async fn list_active_proxies(&self) -> Result<Vec<IspProxy>>;

    async fn list_sites(&self, filter: SiteFilter) -> Result<Vec<Site>>;

    async fn get_site(&self, id: i32) -> Result<Option<Site>>;

    async fn update_site_status(&self, id: i32, status: SiteStatus) -> Result<()>;

    async fn update_site_rank(&self, id: i32, ranking: Option<i32>) -> Result<()>;

    async fn touch_proxy_last_check(&self, proxy_id: i32) -> Result<()>;
}

/// Append-only log of probe results and rank checks
#[async_trait]
pub trait ResultLog: Send + Sync {
    async fn append_probe_result(&self, result: &NewProbeResult) -> Result<ProbeResult>;

    async fn append_rank_record(&self, record: &NewRankRecord) -> Result<RankRecord>;

    /// Newest first
    async fn recent_probe_results(&self, site_id: i32, limit: i64) -> Result<Vec<ProbeResult>>;

    /// Newest result for each ISP
    async fn latest_probe_results(&self, site_id: i32) -> Result<Vec<ProbeResult>>;

    /// Newest first
    async fn rank_history(&self, site_id: i32, limit: i64) -> Result<Vec<RankRecord>>;
}

/// Postgres-backed registry and result log
#[derive(Clone)]
pub struct PgStore {
    sites: SiteRepository,
    proxies: ProxyRepository,
    block_results: BlockResultRepository,
    rank_history: RankHistoryRepository,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            sites: SiteRepository::new(pool.clone()),
            proxies: ProxyRepository::new(pool.clone()),
            block_results: BlockResultRepository::new(pool.clone()),
            rank_history: RankHistoryRepository::new(pool),
        }
    }
}

#[async_trait]
impl SiteRegistry for PgStore {
    async fn list_active_proxies(&self) -> Result<Vec<IspProxy>> {
        self.proxies.get_all_active().await
    }

    async fn list_sites(&self, filter: SiteFilter) -> Result<Vec<Site>> {
        self.sites.list(filter).await
    }

    async fn get_site(&self, id: i32) -> Result<Option<Site>> {
        self.sites.get_by_id(id).await
    }

    async fn update_site_status(&self, id: i32, status: SiteStatus) -> Result<()> {
        self.sites.update_status(id, status).await
    }

    async fn update_site_rank(&self, id: i32, ranking: Option<i32>) -> Result<()> {
        self.sites.update_ranking(id, ranking).await
    }

    async fn touch_proxy_last_check(&self, proxy_id: i32) -> Result<()> {
        self.proxies.touch_last_check(proxy_id).await
    }
}

#[async_trait]
impl ResultLog for PgStore {
    async fn append_probe_result(&self, result: &NewProbeResult) -> Result<ProbeResult> {
        self.block_results.insert(result).await
    }

    async fn append_rank_record(&self, record: &NewRankRecord) -> Result<RankRecord> {
        self.rank_history.insert(record).await
    }

    async fn recent_probe_results(&self, site_id: i32, limit: i64) -> Result<Vec<ProbeResult>> {
        self.block_results.recent_for_site(site_id, limit).await
    }

    async fn latest_probe_results(&self, site_id: i32) -> Result<Vec<ProbeResult>> {
        self.block_results.latest_per_isp(site_id).await
    }

    async fn rank_history(&self, site_id: i32, limit: i64) -> Result<Vec<RankRecord>> {
        self.rank_history.for_site(site_id, limit).await
    }
}
