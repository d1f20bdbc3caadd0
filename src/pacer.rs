//! Fixed pauses between sequential outbound calls.
//!
//! Probes, search windows and keyword lookups are spaced out so a sweep does
//! not hammer the proxies or the search API. All waits go through [`Pacer`]
//! so tests can run with zero delays.

use std::time::Duration;

use crate::config::PacingConfig;

/// A point in a sweep where a pause is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceStep {
    /// Between two proxies while checking one site
    BetweenProxies,
    /// Between two search windows of one keyword
    BetweenWindows,
    /// Between two keywords (or two sites during a rank sweep)
    BetweenKeywords,
}

impl PaceStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaceStep::BetweenProxies => "between_proxies",
            PaceStep::BetweenWindows => "between_windows",
            PaceStep::BetweenKeywords => "between_keywords",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    between_proxies: Duration,
    between_windows: Duration,
    between_keywords: Duration,
}

impl Default for Pacer {
    fn default() -> Self {
        Self {
            between_proxies: Duration::from_millis(1000),
            between_windows: Duration::from_millis(500),
            between_keywords: Duration::from_millis(2000),
        }
    }
}

impl Pacer {
    pub fn from_config(config: &PacingConfig) -> Self {
        Self {
            between_proxies: config.between_proxies,
            between_windows: config.between_windows,
            between_keywords: config.between_keywords,
        }
    }

    /// Pacer that never waits
    pub fn immediate() -> Self {
        Self {
            between_proxies: Duration::ZERO,
            between_windows: Duration::ZERO,
            between_keywords: Duration::ZERO,
        }
    }

    pub fn duration(&self, step: PaceStep) -> Duration {
        match step {
            PaceStep::BetweenProxies => self.between_proxies,
            PaceStep::BetweenWindows => self.between_windows,
            PaceStep::BetweenKeywords => self.between_keywords,
        }
    }

    pub async fn pause(&self, step: PaceStep) {
        let delay = self.duration(step);
        if delay.is_zero() {
            return;
        }

        tracing::trace!(step = step.as_str(), delay_ms = delay.as_millis() as u64, "Pacing");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_durations() {
        let pacer = Pacer::default();
        assert_eq!(pacer.duration(PaceStep::BetweenProxies), Duration::from_secs(1));
        assert_eq!(pacer.duration(PaceStep::BetweenWindows), Duration::from_millis(500));
        assert_eq!(pacer.duration(PaceStep::BetweenKeywords), Duration::from_secs(2));
    }

    #[test]
    fn test_from_config() {
        let pacer = Pacer::from_config(&PacingConfig {
            between_proxies: Duration::from_millis(10),
            between_windows: Duration::from_millis(20),
            between_keywords: Duration::from_millis(30),
        });
        assert_eq!(pacer.duration(PaceStep::BetweenWindows), Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_sleeps_for_step_duration() {
        let started = tokio::time::Instant::now();
        Pacer::default().pause(PaceStep::BetweenKeywords).await;
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_immediate_pacer_does_not_wait() {
        let started = std::time::Instant::now();
        Pacer::immediate().pause(PaceStep::BetweenProxies).await;
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
