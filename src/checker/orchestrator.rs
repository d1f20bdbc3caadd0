//! Runs probe pairs across every active ISP proxy for one or many sites

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use super::probe::Prober;
use crate::error::{Result, WatchError};
use crate::models::{
    aggregate_site_status, Classification, IspCheck, IspProxy, NewProbeResult, Site,
    SiteCheckReport,
};
use crate::pacer::{PaceStep, Pacer};
use crate::repository::{ResultLog, SiteRegistry};

/// Sequences probes across the proxy set and records every outcome
pub struct BlockOrchestrator {
    registry: Arc<dyn SiteRegistry>,
    results: Arc<dyn ResultLog>,
    prober: Arc<dyn Prober>,
    pacer: Pacer,
}

impl BlockOrchestrator {
    pub fn new(
        registry: Arc<dyn SiteRegistry>,
        results: Arc<dyn ResultLog>,
        prober: Arc<dyn Prober>,
        pacer: Pacer,
    ) -> Self {
        Self {
            registry,
            results,
            prober,
            pacer,
        }
    }

    pub fn prober(&self) -> &Arc<dyn Prober> {
        &self.prober
    }

    /// Probe `site` through every proxy, in ISP-label order.
    ///
    /// One result is appended per proxy and the aggregate status is written
    /// back to the site.
    #[instrument(skip(self, site, proxies), fields(site_id = site.id, domain = %site.domain))]
    pub async fn check_site(&self, site: &Site, proxies: &[IspProxy]) -> Result<SiteCheckReport> {
        if proxies.is_empty() {
            return Err(WatchError::NoActiveProxies);
        }

        let ordered = ordered_by_isp(proxies);
        let mut results = Vec::with_capacity(ordered.len());

        for (idx, proxy) in ordered.iter().enumerate() {
            let connection = match proxy.connection() {
                Ok(connection) => connection,
                Err(e) => {
                    warn!(isp = %proxy.isp_name, error = %e, "Skipping proxy without usable URL");
                    results.push(self.record(site, proxy, Classification::error(e.to_string())).await);
                    continue;
                }
            };

            let classification = self.prober.probe(&site.domain, &connection).await;
            results.push(self.record(site, proxy, classification).await);

            if let Err(e) = self.registry.touch_proxy_last_check(proxy.id).await {
                warn!(isp = %proxy.isp_name, error = %e, "Failed to update proxy last check");
            }

            if idx + 1 < ordered.len() {
                self.pacer.pause(PaceStep::BetweenProxies).await;
            }
        }

        let status = aggregate_site_status(results.iter().map(|r| &r.classification.status));
        self.registry.update_site_status(site.id, status).await?;

        info!(status = %status, proxies = results.len(), "Site check complete");

        Ok(SiteCheckReport {
            site_id: site.id,
            domain: site.domain.clone(),
            status,
            results,
            error: None,
        })
    }

    /// Check every site in order. A site that fails unexpectedly yields an
    /// `error` report and the remaining sites still run.
    ///
    /// The proxy gap also applies between sites, so the last proxy of one
    /// site is never hit straight before the first proxy of the next.
    #[instrument(skip(self, sites, proxies), fields(sites = sites.len(), proxies = proxies.len()))]
    pub async fn check_sites(
        &self,
        sites: &[Site],
        proxies: &[IspProxy],
    ) -> Result<Vec<SiteCheckReport>> {
        if proxies.is_empty() {
            return Err(WatchError::NoActiveProxies);
        }

        let mut reports = Vec::with_capacity(sites.len());
        for (idx, site) in sites.iter().enumerate() {
            if idx > 0 {
                self.pacer.pause(PaceStep::BetweenProxies).await;
            }
            match self.check_site(site, proxies).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(site_id = site.id, domain = %site.domain, error = %e, "Site check failed");
                    reports.push(SiteCheckReport::failed(site.id, &site.domain, e.to_string()));
                }
            }
        }

        Ok(reports)
    }

    /// Load the site and the active proxies, then [`check_site`](Self::check_site)
    pub async fn check_site_by_id(&self, site_id: i32) -> Result<SiteCheckReport> {
        let site = self
            .registry
            .get_site(site_id)
            .await?
            .ok_or(WatchError::SiteNotFound { id: site_id })?;

        let proxies = self.active_proxies().await?;
        self.check_site(&site, &proxies).await
    }

    /// Batch variant of [`check_site_by_id`](Self::check_site_by_id). Unknown
    /// ids produce an `error` report in place.
    pub async fn check_sites_by_id(&self, site_ids: &[i32]) -> Result<Vec<SiteCheckReport>> {
        let proxies = self.active_proxies().await?;

        let mut reports = Vec::with_capacity(site_ids.len());
        let mut probed = false;
        for &site_id in site_ids {
            let site = match self.registry.get_site(site_id).await {
                Ok(Some(site)) => site,
                Ok(None) => {
                    let e = WatchError::SiteNotFound { id: site_id };
                    reports.push(SiteCheckReport::failed(site_id, "", e.to_string()));
                    continue;
                }
                Err(e) => {
                    error!(site_id, error = %e, "Failed to load site");
                    reports.push(SiteCheckReport::failed(site_id, "", e.to_string()));
                    continue;
                }
            };

            if probed {
                self.pacer.pause(PaceStep::BetweenProxies).await;
            }
            probed = true;
            reports.extend(self.check_sites(std::slice::from_ref(&site), &proxies).await?);
        }

        Ok(reports)
    }

    async fn active_proxies(&self) -> Result<Vec<IspProxy>> {
        let proxies = self.registry.list_active_proxies().await?;
        if proxies.is_empty() {
            return Err(WatchError::NoActiveProxies);
        }
        Ok(proxies)
    }

    /// Append one proxy's result. A persistence failure turns the entry into
    /// an `ERROR` for that proxy only.
    async fn record(&self, site: &Site, proxy: &IspProxy, classification: Classification) -> IspCheck {
        let entry = NewProbeResult {
            website_id: site.id,
            isp_name: proxy.isp_name.clone(),
            classification,
        };

        match self.results.append_probe_result(&entry).await {
            Ok(_) => IspCheck {
                isp: entry.isp_name,
                classification: entry.classification,
            },
            Err(e) => {
                error!(isp = %proxy.isp_name, error = %e, "Failed to save probe result");
                IspCheck {
                    isp: entry.isp_name,
                    classification: Classification::error(e.to_string()),
                }
            }
        }
    }
}

/// Stable sort by ISP label
fn ordered_by_isp(proxies: &[IspProxy]) -> Vec<&IspProxy> {
    let mut ordered: Vec<&IspProxy> = proxies.iter().collect();
    ordered.sort_by(|a, b| a.isp_name.cmp(&b.isp_name));
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::probe::{FailureKind, Protocol, ProtocolOutcome};
    use crate::models::{BlockStatus, SiteStatus};
    use crate::test_support::{proxy, site, MemoryStore, ScriptedProber};

    fn orchestrator(store: &Arc<MemoryStore>, prober: &Arc<ScriptedProber>) -> BlockOrchestrator {
        BlockOrchestrator::new(
            store.clone(),
            store.clone(),
            prober.clone(),
            Pacer::immediate(),
        )
    }

    #[tokio::test]
    async fn test_two_proxies_one_https_block() {
        let store = Arc::new(MemoryStore::new());
        store.add_site(site(1, "example.com", None));
        store.add_proxy(proxy(1, "A", "http://proxy-a:8080"));
        store.add_proxy(proxy(2, "B", "http://proxy-b:8080"));

        let prober = Arc::new(
            ScriptedProber::new()
                .on("proxy-b", Protocol::Http, ProtocolOutcome::reached(200))
                .on("proxy-b", Protocol::Https, ProtocolOutcome::unreached(FailureKind::Timeout)),
        );

        let report = orchestrator(&store, &prober).check_site_by_id(1).await.unwrap();

        assert_eq!(report.status, SiteStatus::Blocked);
        let statuses: Vec<_> = report.results.iter().map(|r| (r.isp.as_str(), r.status())).collect();
        assert_eq!(statuses, vec![("A", BlockStatus::Ok), ("B", BlockStatus::BlockHttps)]);

        let stored = store.probe_results();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].status, "BLOCK_HTTPS");
        assert_eq!(store.site(1).unwrap().status.as_deref(), Some("blocked"));
        assert_eq!(store.touched_proxies(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_proxies_probed_in_isp_order() {
        let store = Arc::new(MemoryStore::new());
        let site = site(1, "example.com", None);
        let proxies = vec![
            proxy(1, "Viettel", "http://viettel:1"),
            proxy(2, "FPT", "http://fpt:1"),
            proxy(3, "VNPT", "http://vnpt:1"),
        ];
        let prober = Arc::new(ScriptedProber::new());

        let report = orchestrator(&store, &prober)
            .check_site(&site, &proxies)
            .await
            .unwrap();

        let order: Vec<_> = report.results.iter().map(|r| r.isp.clone()).collect();
        assert_eq!(order, vec!["FPT", "VNPT", "Viettel"]);
        assert_eq!(report.status, SiteStatus::Active);
    }

    #[tokio::test]
    async fn test_unusable_proxy_becomes_error_without_probing() {
        let store = Arc::new(MemoryStore::new());
        let site = site(1, "example.com", None);
        let mut broken = proxy(2, "Broken", "");
        broken.proxy_url = None;
        broken.ip = None;
        let proxies = vec![proxy(1, "Good", "http://good:1"), broken];
        let prober = Arc::new(ScriptedProber::new());

        let report = orchestrator(&store, &prober)
            .check_site(&site, &proxies)
            .await
            .unwrap();

        assert_eq!(report.status, SiteStatus::Error);
        assert_eq!(report.results[0].status(), BlockStatus::Error);
        assert_eq!(
            report.results[0].classification.error_message.as_deref(),
            Some("Invalid proxy URL format: Proxy URL cannot be built from provided fields")
        );
        assert_eq!(prober.calls(), 2);
        assert_eq!(store.probe_results().len(), 2);
        assert_eq!(store.touched_proxies(), vec![1]);
    }

    #[tokio::test]
    async fn test_persist_failure_marks_only_that_proxy() {
        let store = Arc::new(MemoryStore::new());
        store.fail_probe_appends_for("A");
        let site = site(1, "example.com", None);
        let proxies = vec![proxy(1, "A", "http://a:1"), proxy(2, "B", "http://b:1")];
        let prober = Arc::new(ScriptedProber::new());

        let report = orchestrator(&store, &prober)
            .check_site(&site, &proxies)
            .await
            .unwrap();

        assert_eq!(report.results[0].status(), BlockStatus::Error);
        assert_eq!(report.results[1].status(), BlockStatus::Ok);
        assert_eq!(report.status, SiteStatus::Error);
    }

    #[tokio::test]
    async fn test_no_proxies_fails_before_probing() {
        let store = Arc::new(MemoryStore::new());
        store.add_site(site(1, "example.com", None));
        let prober = Arc::new(ScriptedProber::new());
        let orchestrator = orchestrator(&store, &prober);

        assert!(matches!(
            orchestrator.check_site_by_id(1).await,
            Err(WatchError::NoActiveProxies)
        ));
        assert!(matches!(
            orchestrator.check_sites(&[site(1, "example.com", None)], &[]).await,
            Err(WatchError::NoActiveProxies)
        ));
        assert_eq!(prober.calls(), 0);
    }

    #[tokio::test]
    async fn test_check_sites_keeps_going_after_failure() {
        let store = Arc::new(MemoryStore::new());
        store.fail_status_updates_for(2);
        let sites = vec![
            site(1, "one.example", None),
            site(2, "two.example", None),
            site(3, "three.example", None),
        ];
        let proxies = vec![proxy(1, "A", "http://a:1")];
        let prober = Arc::new(ScriptedProber::new());

        let reports = orchestrator(&store, &prober)
            .check_sites(&sites, &proxies)
            .await
            .unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].status, SiteStatus::Active);
        assert_eq!(reports[1].status, SiteStatus::Error);
        assert!(reports[1].error.is_some());
        assert_eq!(reports[2].status, SiteStatus::Active);
    }

    #[tokio::test]
    async fn test_unknown_site_ids() {
        let store = Arc::new(MemoryStore::new());
        store.add_site(site(1, "example.com", None));
        store.add_proxy(proxy(1, "A", "http://a:1"));
        let prober = Arc::new(ScriptedProber::new());
        let orchestrator = orchestrator(&store, &prober);

        assert!(matches!(
            orchestrator.check_site_by_id(42).await,
            Err(WatchError::SiteNotFound { id: 42 })
        ));

        let reports = orchestrator.check_sites_by_id(&[1, 42]).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].status, SiteStatus::Active);
        assert_eq!(reports[1].site_id, 42);
        assert_eq!(reports[1].status, SiteStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_between_proxies_only() {
        let store = Arc::new(MemoryStore::new());
        let site = site(1, "example.com", None);
        let proxies = vec![
            proxy(1, "A", "http://a:1"),
            proxy(2, "B", "http://b:1"),
            proxy(3, "C", "http://c:1"),
        ];
        let prober = Arc::new(ScriptedProber::new());
        let orchestrator = BlockOrchestrator::new(
            store.clone(),
            store.clone(),
            prober.clone(),
            Pacer::default(),
        );

        let started = tokio::time::Instant::now();
        orchestrator.check_site(&site, &proxies).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= std::time::Duration::from_secs(2));
        assert!(elapsed < std::time::Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_between_consecutive_sites() {
        let store = Arc::new(MemoryStore::new());
        let sites = vec![
            site(1, "one.example", None),
            site(2, "two.example", None),
            site(3, "three.example", None),
        ];
        let proxies = vec![proxy(1, "A", "http://a:1")];
        let prober = Arc::new(ScriptedProber::new());
        let orchestrator = BlockOrchestrator::new(
            store.clone(),
            store.clone(),
            prober.clone(),
            Pacer::default(),
        );

        let started = tokio::time::Instant::now();
        let reports = orchestrator.check_sites(&sites, &proxies).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(reports.len(), 3);
        assert_eq!(prober.calls(), 6);
        assert!(elapsed >= std::time::Duration::from_secs(2));
        assert!(elapsed < std::time::Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_between_sites_loaded_by_id() {
        let store = Arc::new(MemoryStore::new());
        store.add_site(site(1, "one.example", None));
        store.add_site(site(2, "two.example", None));
        store.add_proxy(proxy(1, "A", "http://a:1"));
        let prober = Arc::new(ScriptedProber::new());
        let orchestrator = BlockOrchestrator::new(
            store.clone(),
            store.clone(),
            prober.clone(),
            Pacer::default(),
        );

        let started = tokio::time::Instant::now();
        let reports = orchestrator.check_sites_by_id(&[1, 42, 2]).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[1].status, SiteStatus::Error);
        assert!(elapsed >= std::time::Duration::from_secs(1));
        assert!(elapsed < std::time::Duration::from_secs(2));
    }
}
