//! Failed onboarding attempts per source, for spotting abuse of the public
//! onboarding endpoint.
//!
//! Counters live in a TTL cache: a source with no new failure for
//! `onboarding_failure_window` starts again from zero, and a successful
//! attempt clears its counter at once.

use std::time::Duration;

use moka::future::Cache;

use crate::config::TenancyConfig;

/// Per-source failure counter with a warning threshold.
pub struct OnboardingMonitor {
    failures: Cache<String, u32>,
    threshold: u32,
    window: Duration,
}

impl std::fmt::Debug for OnboardingMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnboardingMonitor")
            .field("tracked", &self.failures.entry_count())
            .field("threshold", &self.threshold)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl OnboardingMonitor {
    #[must_use]
    pub fn new(cfg: &TenancyConfig) -> Self {
        let failures = Cache::builder()
            .max_capacity(cfg.max_entries)
            .time_to_live(cfg.onboarding_failure_window)
            .build();
        Self {
            failures,
            threshold: cfg.onboarding_failure_threshold,
            window: cfg.onboarding_failure_window,
        }
    }

    /// Record the outcome of one onboarding attempt from `source` (a client
    /// address or subject id).
    pub async fn record(&self, source: &str, success: bool) {
        if success {
            self.record_success(source).await;
        } else {
            self.record_failure(source).await;
        }
    }

    /// Count a failed attempt and return the failures seen in the window.
    pub async fn record_failure(&self, source: &str) -> u32 {
        let failures = self
            .failures
            .entry_by_ref(source)
            .and_upsert_with(|prev| {
                let count = prev.map_or(0, moka::Entry::into_value);
                std::future::ready(count.saturating_add(1))
            })
            .await
            .into_value();

        if failures >= self.threshold {
            tracing::warn!(source, failures, "suspicious onboarding activity");
        } else {
            tracing::debug!(source, failures, "onboarding attempt failed");
        }
        failures
    }

    /// Forget earlier failures of `source`.
    pub async fn record_success(&self, source: &str) {
        self.failures.invalidate(source).await;
    }

    /// Failures currently counted for `source`.
    pub async fn failures(&self, source: &str) -> u32 {
        self.failures.get(source).await.unwrap_or(0)
    }
}
