use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::client::{SearchClient, SearchQuery};
use super::matcher::find_position;
use crate::error::{Result, WatchError};
use crate::models::{RankOptions, RankOutcome, RankWindow, NOT_FOUND_MESSAGE};
use crate::pacer::{PaceStep, Pacer};

/// Search windows tried in order. The windows overlap; the absolute
/// position is always `start + in-window rank`.
pub const RANK_WINDOWS: [RankWindow; 3] = [
    RankWindow::new(0, 50),
    RankWindow::new(10, 40),
    RankWindow::new(20, 30),
];

/// Resolves a domain's organic position for keywords
pub struct RankResolver {
    client: Arc<dyn SearchClient>,
    pacer: Pacer,
    defaults: RankOptions,
}

impl RankResolver {
    pub fn new(client: Arc<dyn SearchClient>, pacer: Pacer, defaults: RankOptions) -> Self {
        Self {
            client,
            pacer,
            defaults,
        }
    }

    /// Locale used when a caller does not pick one
    pub fn default_options(&self) -> &RankOptions {
        &self.defaults
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    /// Query the windows in order and stop at the first hit.
    ///
    /// Running out of credits aborts the remaining windows. Any other window
    /// failure is remembered and the next window is tried.
    #[instrument(skip(self, options), fields(keyword = %keyword, domain = %domain))]
    pub async fn resolve_rank(
        &self,
        keyword: &str,
        domain: &str,
        target_url: Option<&str>,
        options: &RankOptions,
    ) -> Result<RankOutcome> {
        if !self.client.is_configured() {
            return Err(WatchError::SearchNotConfigured);
        }

        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(WatchError::InvalidRequest("keyword is required".to_string()));
        }
        if domain.trim().is_empty() {
            return Err(WatchError::InvalidRequest("domain is required".to_string()));
        }

        let mut outcome = RankOutcome::failed(keyword, domain, NOT_FOUND_MESSAGE);
        let mut last_error: Option<String> = None;

        for (idx, window) in RANK_WINDOWS.iter().enumerate() {
            let query = SearchQuery {
                keyword: keyword.to_string(),
                country: options.country.clone(),
                language: options.language.clone(),
                window: *window,
            };

            match self.client.search(&query).await {
                Ok(page) => {
                    if outcome.search_id.is_none() {
                        outcome.search_id = page.search_id;
                    }

                    if let Some(hit) = find_position(&page.organic_results, domain, target_url) {
                        let position = window.absolute(hit.rank);
                        info!(position, window = idx + 1, "Domain found");

                        outcome.success = true;
                        outcome.position = Some(position);
                        outcome.found_url = Some(hit.url);
                        outcome.error = None;
                        return Ok(outcome);
                    }

                    debug!(window = idx + 1, start = window.start, "Not found in window");
                }
                Err(WatchError::SearchQuotaExhausted(message)) => {
                    warn!(window = idx + 1, "Search credits exhausted, stopping");
                    outcome.error = Some(message);
                    outcome.quota_exhausted = true;
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!(window = idx + 1, error = %e, "Search window failed");
                    last_error = Some(e.to_string());
                }
            }

            if idx + 1 < RANK_WINDOWS.len() {
                self.pacer.pause(PaceStep::BetweenWindows).await;
            }
        }

        if let Some(error) = last_error {
            outcome.error = Some(error);
        }
        Ok(outcome)
    }

    /// Resolve several keywords one after another. The result has one
    /// outcome per input keyword, in order. A keyword that fails to resolve,
    /// including a blank one, produces a failed outcome in its slot instead
    /// of aborting the batch.
    #[instrument(skip(self, keywords, options), fields(domain = %domain, keywords = keywords.len()))]
    pub async fn resolve_rank_many(
        &self,
        keywords: &[String],
        domain: &str,
        target_url: Option<&str>,
        options: &RankOptions,
    ) -> Result<Vec<RankOutcome>> {
        if keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(WatchError::NoActiveKeywords);
        }

        let mut outcomes = Vec::with_capacity(keywords.len());
        let mut searched = false;
        for keyword in keywords.iter().map(|k| k.trim()) {
            if keyword.is_empty() {
                outcomes.push(RankOutcome::failed(
                    keyword,
                    domain,
                    WatchError::InvalidRequest("keyword is required".to_string()).to_string(),
                ));
                continue;
            }

            if searched {
                self.pacer.pause(PaceStep::BetweenKeywords).await;
            }
            searched = true;

            let outcome = match self.resolve_rank(keyword, domain, target_url, options).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(keyword = %keyword, error = %e, "Rank check failed");
                    RankOutcome::failed(keyword, domain, e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}
