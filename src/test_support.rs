//! In-memory collaborators for unit tests

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use parking_lot::Mutex;

use crate::checker::probe::{Prober, Protocol, ProtocolOutcome};
use crate::config::{
    AdminConfig, ApiServerConfig, Config, DatabaseConfig, LogConfig, PacingConfig, ProbeConfig,
    SchedulerConfig, SearchConfig,
};
use crate::error::{Result, WatchError};
use crate::models::{
    IspProxy, NewProbeResult, NewRankRecord, ProbeResult, ProxyConnection, RankRecord, Site,
    SiteFilter, SiteStatus,
};
use crate::rank::client::{SearchClient, SearchPage, SearchQuery};
use crate::rank::matcher::OrganicResult;
use crate::repository::{ResultLog, SiteRegistry};

/// Configuration with the built-in defaults and no search key
pub fn config() -> Config {
    Config {
        api: ApiServerConfig {
            port: 3000,
            host: "127.0.0.1".to_string(),
            cors_origins: Vec::new(),
            jwt_secret: "test-secret".to_string(),
            session_ttl_hours: 24,
        },
        database: DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            name: "website_management".to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        admin: AdminConfig {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        },
        probe: ProbeConfig {
            timeout_secs: 10,
            max_redirects: 5,
            user_agent: "sitewatch-test".to_string(),
        },
        search: SearchConfig {
            api_key: None,
            base_url: "https://serpapi.com/search.json".to_string(),
            timeout_secs: 60,
            default_country: "vn".to_string(),
            default_language: "vi".to_string(),
        },
        scheduler: SchedulerConfig {
            enabled: false,
            block_sweep_interval: Duration::from_secs(6 * 3600),
            rank_sweep_time: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        },
        pacing: PacingConfig {
            between_proxies: Duration::ZERO,
            between_windows: Duration::ZERO,
            between_keywords: Duration::ZERO,
        },
        log: LogConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

pub fn site(id: i32, domain: &str, keyword: Option<&str>) -> Site {
    Site {
        id,
        domain: domain.to_string(),
        keyword: keyword.map(str::to_string),
        ranking: None,
        status: None,
        note: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn proxy(id: i32, isp: &str, url: &str) -> IspProxy {
    IspProxy {
        id,
        isp_name: isp.to_string(),
        proxy_url: Some(url.to_string()).filter(|u| !u.is_empty()),
        ip: None,
        port: None,
        username: None,
        password: None,
        status: "active".to_string(),
        last_check: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn page(links: &[&str], search_id: Option<&str>) -> SearchPage {
    SearchPage {
        organic_results: links
            .iter()
            .map(|link| OrganicResult {
                link: Some(link.to_string()),
                ..Default::default()
            })
            .collect(),
        search_id: search_id.map(str::to_string),
    }
}

#[derive(Default)]
struct StoreState {
    sites: BTreeMap<i32, Site>,
    proxies: Vec<IspProxy>,
    probe_results: Vec<ProbeResult>,
    rank_records: Vec<RankRecord>,
    touched: Vec<i32>,
    failing_isps: HashSet<String>,
    failing_status_sites: HashSet<i32>,
    next_id: i32,
}

/// Registry and result log backed by plain collections
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_site(&self, site: Site) {
        self.state.lock().sites.insert(site.id, site);
    }

    pub fn add_proxy(&self, proxy: IspProxy) {
        self.state.lock().proxies.push(proxy);
    }

    pub fn set_ranking(&self, site_id: i32, ranking: Option<i32>) {
        if let Some(site) = self.state.lock().sites.get_mut(&site_id) {
            site.ranking = ranking;
        }
    }

    pub fn site(&self, id: i32) -> Option<Site> {
        self.state.lock().sites.get(&id).cloned()
    }

    pub fn probe_results(&self) -> Vec<ProbeResult> {
        self.state.lock().probe_results.clone()
    }

    pub fn rank_records(&self) -> Vec<RankRecord> {
        self.state.lock().rank_records.clone()
    }

    pub fn touched_proxies(&self) -> Vec<i32> {
        self.state.lock().touched.clone()
    }

    /// Appending a probe result for this ISP fails
    pub fn fail_probe_appends_for(&self, isp: &str) {
        self.state.lock().failing_isps.insert(isp.to_string());
    }

    /// Writing this site's status fails
    pub fn fail_status_updates_for(&self, site_id: i32) {
        self.state.lock().failing_status_sites.insert(site_id);
    }
}

#[async_trait]
impl SiteRegistry for MemoryStore {
    async fn list_active_proxies(&self) -> Result<Vec<IspProxy>> {
        Ok(self
            .state
            .lock()
            .proxies
            .iter()
            .filter(|p| p.is_active())
            .cloned()
            .collect())
    }

    async fn list_sites(&self, filter: SiteFilter) -> Result<Vec<Site>> {
        Ok(self
            .state
            .lock()
            .sites
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn get_site(&self, id: i32) -> Result<Option<Site>> {
        Ok(self.site(id))
    }

    async fn update_site_status(&self, id: i32, status: SiteStatus) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_status_sites.contains(&id) {
            return Err(WatchError::Internal("simulated status write failure".into()));
        }
        if let Some(site) = state.sites.get_mut(&id) {
            site.status = Some(status.as_str().to_string());
        }
        Ok(())
    }

    async fn update_site_rank(&self, id: i32, ranking: Option<i32>) -> Result<()> {
        self.set_ranking(id, ranking);
        Ok(())
    }

    async fn touch_proxy_last_check(&self, proxy_id: i32) -> Result<()> {
        let mut state = self.state.lock();
        state.touched.push(proxy_id);
        if let Some(proxy) = state.proxies.iter_mut().find(|p| p.id == proxy_id) {
            proxy.last_check = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl ResultLog for MemoryStore {
    async fn append_probe_result(&self, result: &NewProbeResult) -> Result<ProbeResult> {
        let mut state = self.state.lock();
        if state.failing_isps.contains(&result.isp_name) {
            return Err(WatchError::Internal("simulated insert failure".into()));
        }

        state.next_id += 1;
        let row = ProbeResult {
            id: state.next_id,
            website_id: result.website_id,
            isp_name: result.isp_name.clone(),
            status: result.classification.status.as_str().to_string(),
            http_code: result.classification.http_code.map(i32::from),
            error_message: result.classification.error_message.clone(),
            checked_at: Utc::now(),
        };
        state.probe_results.push(row.clone());
        Ok(row)
    }

    async fn append_rank_record(&self, record: &NewRankRecord) -> Result<RankRecord> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let row = RankRecord {
            id: state.next_id,
            website_id: record.website_id,
            keyword: record.keyword.clone(),
            position: record.position,
            found_url: record.found_url.clone(),
            serpapi_search_id: record.search_id.clone(),
            checked_at: Utc::now(),
        };
        state.rank_records.push(row.clone());
        Ok(row)
    }

    async fn recent_probe_results(&self, site_id: i32, limit: i64) -> Result<Vec<ProbeResult>> {
        Ok(self
            .state
            .lock()
            .probe_results
            .iter()
            .rev()
            .filter(|r| r.website_id == site_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn latest_probe_results(&self, site_id: i32) -> Result<Vec<ProbeResult>> {
        let state = self.state.lock();
        let mut latest: BTreeMap<String, ProbeResult> = BTreeMap::new();
        for row in state.probe_results.iter().filter(|r| r.website_id == site_id) {
            latest.insert(row.isp_name.clone(), row.clone());
        }
        Ok(latest.into_values().collect())
    }

    async fn rank_history(&self, site_id: i32, limit: i64) -> Result<Vec<RankRecord>> {
        Ok(self
            .state
            .lock()
            .rank_records
            .iter()
            .rev()
            .filter(|r| r.website_id == site_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

enum ProbeTarget {
    ProxyHost(String),
    Domain(String),
}

struct ProbeRule {
    target: ProbeTarget,
    protocol: Protocol,
    outcome: ProtocolOutcome,
}

/// Prober answering from a fixed rule list. Unmatched probes reach with 200.
#[derive(Default)]
pub struct ScriptedProber {
    rules: Vec<ProbeRule>,
    calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome for every probe routed through the proxy at `proxy_host`
    pub fn on(mut self, proxy_host: &str, protocol: Protocol, outcome: ProtocolOutcome) -> Self {
        self.rules.push(ProbeRule {
            target: ProbeTarget::ProxyHost(proxy_host.to_string()),
            protocol,
            outcome,
        });
        self
    }

    /// Outcome for every probe of `domain`, whatever the proxy
    pub fn on_domain(mut self, domain: &str, protocol: Protocol, outcome: ProtocolOutcome) -> Self {
        self.rules.push(ProbeRule {
            target: ProbeTarget::Domain(domain.to_string()),
            protocol,
            outcome,
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe_protocol(
        &self,
        domain: &str,
        protocol: Protocol,
        proxy: &ProxyConnection,
    ) -> ProtocolOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);

        self.rules
            .iter()
            .find(|rule| {
                rule.protocol == protocol
                    && match &rule.target {
                        ProbeTarget::ProxyHost(host) => host == proxy.host(),
                        ProbeTarget::Domain(d) => d == domain,
                    }
            })
            .map(|rule| rule.outcome.clone())
            .unwrap_or_else(|| ProtocolOutcome::reached(200))
    }
}

/// Search client answering from a queue. An empty queue yields empty pages.
pub struct ScriptedSearch {
    configured: bool,
    responses: Mutex<VecDeque<Result<SearchPage>>>,
    queries: Mutex<Vec<SearchQuery>>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self {
            configured: true,
            responses: Mutex::new(VecDeque::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn respond(self, response: Result<SearchPage>) -> Self {
        self.responses.lock().push_back(response);
        self
    }

    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchClient for ScriptedSearch {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        self.queries.lock().push(query.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(SearchPage::default()))
    }
}
