//! Periodic block and rank sweeps
//!
//! Block sweeps run on a fixed interval and never overlap. Rank sweeps run
//! once a day at a fixed local time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::checker::BlockOrchestrator;
use crate::config::SchedulerConfig;
use crate::error::{Result, WatchError};
use crate::models::{NewRankRecord, SiteFilter, SiteStatus};
use crate::pacer::{PaceStep, Pacer};
use crate::rank::RankResolver;
use crate::repository::{ResultLog, SiteRegistry};

/// At most one holder at a time
#[derive(Debug, Clone, Default)]
pub struct SweepGuard {
    held: Arc<AtomicBool>,
}

impl SweepGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard, or `None` when a sweep already holds it
    pub fn try_acquire(&self) -> Option<SweepPermit> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepPermit {
                held: Arc::clone(&self.held),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the guard when dropped
#[derive(Debug)]
pub struct SweepPermit {
    held: Arc<AtomicBool>,
}

impl Drop for SweepPermit {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSweepSummary {
    pub sites_checked: usize,
    pub blocked: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankSweepSummary {
    pub keywords_checked: usize,
    pub found: usize,
    pub not_found: usize,
    pub failed: usize,
}

/// Result of asking for a block sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Another sweep held the guard
    Skipped,
    Completed(BlockSweepSummary),
}

/// One finished sweep, kept for the status endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRun<T> {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: Option<T>,
    pub error: Option<String>,
}

impl<T> SweepRun<T> {
    fn finish(started_at: DateTime<Utc>, result: &Result<T>) -> Self
    where
        T: Clone,
    {
        let (summary, error) = match result {
            Ok(summary) => (Some(summary.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            started_at,
            finished_at: Utc::now(),
            summary,
            error,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SweepHistory {
    last_block_sweep: Option<SweepRun<BlockSweepSummary>>,
    last_rank_sweep: Option<SweepRun<RankSweepSummary>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub started: bool,
    pub block_sweep_running: bool,
    pub block_sweep_interval_secs: u64,
    pub rank_sweep_time: String,
    pub next_rank_sweep: DateTime<Local>,
    pub last_block_sweep: Option<SweepRun<BlockSweepSummary>>,
    pub last_rank_sweep: Option<SweepRun<RankSweepSummary>>,
}

/// Coordinates fleet-wide sweeps
pub struct Scheduler {
    registry: Arc<dyn SiteRegistry>,
    results: Arc<dyn ResultLog>,
    orchestrator: Arc<BlockOrchestrator>,
    resolver: Arc<RankResolver>,
    pacer: Pacer,
    config: SchedulerConfig,
    block_guard: SweepGuard,
    started: AtomicBool,
    history: Mutex<SweepHistory>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<dyn SiteRegistry>,
        results: Arc<dyn ResultLog>,
        orchestrator: Arc<BlockOrchestrator>,
        resolver: Arc<RankResolver>,
        pacer: Pacer,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            results,
            orchestrator,
            resolver,
            pacer,
            config,
            block_guard: SweepGuard::new(),
            started: AtomicBool::new(false),
            history: Mutex::new(SweepHistory::default()),
        }
    }

    pub fn block_guard(&self) -> &SweepGuard {
        &self.block_guard
    }

    pub fn status(&self) -> SchedulerStatus {
        let history = self.history.lock().clone();
        SchedulerStatus {
            started: self.started.load(Ordering::Acquire),
            block_sweep_running: self.block_guard.is_held(),
            block_sweep_interval_secs: self.config.block_sweep_interval.as_secs(),
            rank_sweep_time: self.config.rank_sweep_time.format("%H:%M").to_string(),
            next_rank_sweep: next_daily_run(&Local::now(), self.config.rank_sweep_time),
            last_block_sweep: history.last_block_sweep,
            last_rank_sweep: history.last_rank_sweep,
        }
    }

    /// Check every site through every active proxy, unless a block sweep is
    /// already running.
    pub async fn run_block_sweep(&self) -> Result<SweepOutcome> {
        match self.block_guard.try_acquire() {
            Some(permit) => self.run_block_sweep_holding(permit).await.map(SweepOutcome::Completed),
            None => {
                info!("Block sweep already running, skipping");
                Ok(SweepOutcome::Skipped)
            }
        }
    }

    /// Run a block sweep with a permit taken by the caller
    #[instrument(skip(self, _permit))]
    pub async fn run_block_sweep_holding(&self, _permit: SweepPermit) -> Result<BlockSweepSummary> {
        let started_at = Utc::now();
        info!("Starting block sweep");

        let result = self.block_sweep().await;
        match &result {
            Ok(summary) => info!(
                sites = summary.sites_checked,
                blocked = summary.blocked,
                failed = summary.failed,
                "Block sweep completed"
            ),
            Err(e) => error!(error = %e, "Block sweep failed"),
        }

        self.history.lock().last_block_sweep = Some(SweepRun::finish(started_at, &result));
        result
    }

    async fn block_sweep(&self) -> Result<BlockSweepSummary> {
        let sites = self.registry.list_sites(SiteFilter::all()).await?;
        let proxies = self.registry.list_active_proxies().await?;
        if proxies.is_empty() {
            return Err(WatchError::NoActiveProxies);
        }

        let reports = self.orchestrator.check_sites(&sites, &proxies).await?;

        let mut summary = BlockSweepSummary::default();
        for report in &reports {
            if let Some(error) = &report.error {
                warn!(site_id = report.site_id, domain = %report.domain, error = %error, "Site skipped in sweep");
                summary.failed += 1;
                continue;
            }
            summary.sites_checked += 1;
            if report.status == SiteStatus::Blocked {
                summary.blocked += 1;
            }
        }

        Ok(summary)
    }

    /// Resolve the keyword of every site that has one, with the default
    /// locale. Not guarded against overlap.
    #[instrument(skip(self))]
    pub async fn run_rank_sweep(&self) -> Result<RankSweepSummary> {
        let started_at = Utc::now();
        info!("Starting rank sweep");

        let result = self.rank_sweep().await;
        match &result {
            Ok(summary) => info!(
                keywords = summary.keywords_checked,
                found = summary.found,
                failed = summary.failed,
                "Rank sweep completed"
            ),
            Err(e) => error!(error = %e, "Rank sweep failed"),
        }

        self.history.lock().last_rank_sweep = Some(SweepRun::finish(started_at, &result));
        result
    }

    async fn rank_sweep(&self) -> Result<RankSweepSummary> {
        if !self.resolver.is_configured() {
            return Err(WatchError::SearchNotConfigured);
        }

        let sites = self.registry.list_sites(SiteFilter::with_keyword()).await?;
        if sites.is_empty() {
            return Err(WatchError::NoActiveKeywords);
        }

        let options = self.resolver.default_options().clone();
        let mut summary = RankSweepSummary::default();

        for (idx, site) in sites.iter().enumerate() {
            let Some(keyword) = site.tracked_keyword() else {
                continue;
            };
            summary.keywords_checked += 1;

            match self
                .resolver
                .resolve_rank(keyword, &site.domain, None, &options)
                .await
            {
                Ok(outcome) if outcome.is_conclusive() => {
                    let ranking = outcome.position.map(|p| p as i32);
                    let record = NewRankRecord::from_outcome(site.id, &outcome);

                    let saved = match self.registry.update_site_rank(site.id, ranking).await {
                        Ok(()) => self.results.append_rank_record(&record).await.map(|_| ()),
                        Err(e) => Err(e),
                    };

                    match saved {
                        Ok(()) if outcome.success => summary.found += 1,
                        Ok(()) => summary.not_found += 1,
                        Err(e) => {
                            error!(site_id = site.id, error = %e, "Failed to save ranking");
                            summary.failed += 1;
                        }
                    }
                }
                Ok(outcome) => {
                    warn!(
                        site_id = site.id,
                        keyword = %keyword,
                        error = outcome.error.as_deref().unwrap_or_default(),
                        quota_exhausted = outcome.quota_exhausted,
                        "Rank check did not complete"
                    );
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(site_id = site.id, keyword = %keyword, error = %e, "Rank check failed");
                    summary.failed += 1;
                }
            }

            if idx + 1 < sites.len() {
                self.pacer.pause(PaceStep::BetweenKeywords).await;
            }
        }

        Ok(summary)
    }

    /// Spawn the periodic sweep tasks. Returns `None` when the loops are
    /// already running.
    pub fn start(self: &Arc<Self>) -> Option<SchedulerHandle> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Scheduler already started");
            return None;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            block_interval_secs = self.config.block_sweep_interval.as_secs(),
            rank_time = %self.config.rank_sweep_time.format("%H:%M"),
            "Scheduler started"
        );

        let block_task = tokio::spawn(Arc::clone(self).block_loop(shutdown_rx.clone()));
        let rank_task = tokio::spawn(Arc::clone(self).rank_loop(shutdown_rx));

        Some(SchedulerHandle {
            scheduler: Arc::clone(self),
            shutdown_tx,
            tasks: vec![block_task, rank_task],
        })
    }

    async fn block_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.block_sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_block_sweep().await {
                        error!("Scheduled block sweep failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Block sweep loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn rank_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut last_slot: Option<DateTime<Local>> = None;

        loop {
            let now = Local::now();
            let next = next_rank_slot(&now, last_slot.as_ref(), self.config.rank_sweep_time);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    last_slot = Some(next);
                    if let Err(e) = self.run_rank_sweep().await {
                        error!("Scheduled rank sweep failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Rank sweep loop shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Handle for stopping the periodic sweeps
pub struct SchedulerHandle {
    scheduler: Arc<Scheduler>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal both loops and wait for them. A sweep in progress finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);

        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                error!("Scheduler task ended abnormally: {}", e);
            }
        }

        self.scheduler.started.store(false, Ordering::Release);
        info!("Scheduler stopped");
    }
}

/// Next occurrence of `at` strictly after `now`, in `now`'s time zone
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let local_now = now.naive_local();
    let today = local_now.date().and_time(at);
    let candidate = if today > local_now {
        today
    } else {
        today + chrono::Duration::days(1)
    };

    now.timezone()
        .from_local_datetime(&candidate)
        .earliest()
        .unwrap_or_else(|| now.clone() + chrono::Duration::days(1))
}

/// Next daily slot after both `now` and the slot that last fired. A timer
/// that wakes slightly before the wall clock reaches `last` still moves on
/// to the following day.
pub fn next_rank_slot<Tz: TimeZone>(
    now: &DateTime<Tz>,
    last: Option<&DateTime<Tz>>,
    at: NaiveTime,
) -> DateTime<Tz> {
    match last {
        Some(last) if last >= now => next_daily_run(last, at),
        _ => next_daily_run(now, at),
    }
}
