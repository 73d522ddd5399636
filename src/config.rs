//! Configuration for promoscrape.
//!
//! Every empirically-tuned constant lives here with a serde default, so the
//! numbers tuned against one target site stay adjustable instead of becoming
//! accidental contracts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scrapers::BrowserEngineConfig;

/// Orchestration tuning: scheduler ceiling, fan-out shape, aggregation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Admission ceiling: how many work functions run at once.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Hard cap on children created by one fan-out.
    #[serde(default = "default_max_child_jobs")]
    pub max_child_jobs: usize,
    /// Children created per batch during fan-out.
    #[serde(default = "default_child_batch_size")]
    pub child_batch_size: usize,
    /// Pause between child-creation batches, in milliseconds.
    #[serde(default = "default_child_batch_delay_ms")]
    pub child_batch_delay_ms: u64,
    /// Aggregation poll tick, in seconds.
    #[serde(default = "default_aggregation_poll_secs")]
    pub aggregation_poll_secs: u64,
    /// Aggregation deadline, in seconds.
    #[serde(default = "default_aggregation_timeout_secs")]
    pub aggregation_timeout_secs: u64,
    /// TTL for cached results, in seconds.
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_child_jobs: default_max_child_jobs(),
            child_batch_size: default_child_batch_size(),
            child_batch_delay_ms: default_child_batch_delay_ms(),
            aggregation_poll_secs: default_aggregation_poll_secs(),
            aggregation_timeout_secs: default_aggregation_timeout_secs(),
            result_ttl_secs: default_result_ttl_secs(),
        }
    }
}

impl OrchestrationConfig {
    pub fn child_batch_delay(&self) -> Duration {
        Duration::from_millis(self.child_batch_delay_ms)
    }

    pub fn aggregation_poll_interval(&self) -> Duration {
        Duration::from_secs(self.aggregation_poll_secs)
    }

    pub fn aggregation_timeout(&self) -> Duration {
        Duration::from_secs(self.aggregation_timeout_secs)
    }
}

/// Automation tuning for the browser state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Base campaign URL; the campaign id is appended as a path segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bounded wait for the title landmark, in seconds (non-fatal).
    #[serde(default = "default_content_wait_secs")]
    pub content_wait_secs: u64,
    /// Filter activation attempts before the fetch fails.
    #[serde(default = "default_filter_attempts")]
    pub filter_attempts: u32,
    /// Fixed backoff between filter attempts, in milliseconds.
    #[serde(default = "default_filter_retry_delay_ms")]
    pub filter_retry_delay_ms: u64,
    /// Bounded wait for the item estimate to grow after a load-more click,
    /// in milliseconds (non-increase is a warning, not a failure).
    #[serde(default = "default_growth_wait_ms")]
    pub growth_wait_ms: u64,
    /// Full-page scroll passes after the load-more loop.
    #[serde(default = "default_scroll_passes")]
    pub scroll_passes: u32,
    /// Settle time after each scroll, in milliseconds.
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,
    /// Extra discovery attempts after a detached-context failure.
    #[serde(default = "default_discovery_retries")]
    pub discovery_retries: u32,
    /// Delay before a discovery retry, in milliseconds.
    #[serde(default = "default_discovery_retry_delay_ms")]
    pub discovery_retry_delay_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            content_wait_secs: default_content_wait_secs(),
            filter_attempts: default_filter_attempts(),
            filter_retry_delay_ms: default_filter_retry_delay_ms(),
            growth_wait_ms: default_growth_wait_ms(),
            scroll_passes: default_scroll_passes(),
            scroll_settle_ms: default_scroll_settle_ms(),
            discovery_retries: default_discovery_retries(),
            discovery_retry_delay_ms: default_discovery_retry_delay_ms(),
        }
    }
}

impl FetcherConfig {
    pub fn filter_retry_delay(&self) -> Duration {
        Duration::from_millis(self.filter_retry_delay_ms)
    }

    pub fn growth_wait(&self) -> Duration {
        Duration::from_millis(self.growth_wait_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn discovery_retry_delay(&self) -> Duration {
        Duration::from_millis(self.discovery_retry_delay_ms)
    }

    pub fn content_wait(&self) -> Duration {
        Duration::from_secs(self.content_wait_secs)
    }
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Data directory for the durable store (jobs + cache mirror).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub browser: BrowserEngineConfig,
}

impl Settings {
    /// Load from a TOML file, or defaults when the file is absent.
    ///
    /// `PROMO_BROWSER_URL` overrides the remote browser endpoint.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| anyhow::anyhow!("read config {}: {e}", p.display()))?;
                toml::from_str(&text)
                    .map_err(|e| anyhow::anyhow!("parse config {}: {e}", p.display()))?
            }
            None => Self::default(),
        };

        if let Ok(url) = std::env::var("PROMO_BROWSER_URL") {
            if !url.is_empty() {
                settings.browser.remote_url = Some(url);
            }
        }

        Ok(settings)
    }

    /// Resolved data directory: configured, or `~/.local/share/promoscrape`,
    /// or `./promoscrape-data` as a last resort.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|d| d.join("promoscrape"))
            .unwrap_or_else(|| PathBuf::from("promoscrape-data"))
    }
}

fn default_max_concurrent_jobs() -> usize {
    3
}

fn default_max_child_jobs() -> usize {
    50
}

fn default_child_batch_size() -> usize {
    5
}

fn default_child_batch_delay_ms() -> u64 {
    1000
}

fn default_aggregation_poll_secs() -> u64 {
    5
}

fn default_aggregation_timeout_secs() -> u64 {
    600
}

fn default_result_ttl_secs() -> u64 {
    3600
}

fn default_base_url() -> String {
    "https://example-retail.test/campaigns".into()
}

fn default_content_wait_secs() -> u64 {
    10
}

fn default_filter_attempts() -> u32 {
    3
}

fn default_filter_retry_delay_ms() -> u64 {
    2000
}

fn default_growth_wait_ms() -> u64 {
    4000
}

fn default_scroll_passes() -> u32 {
    2
}

fn default_scroll_settle_ms() -> u64 {
    500
}

fn default_discovery_retries() -> u32 {
    2
}

fn default_discovery_retry_delay_ms() -> u64 {
    1500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tuning() {
        let s = Settings::default();
        assert_eq!(s.orchestration.max_concurrent_jobs, 3);
        assert_eq!(s.orchestration.max_child_jobs, 50);
        assert_eq!(s.orchestration.child_batch_size, 5);
        assert_eq!(s.orchestration.aggregation_poll_secs, 5);
        assert_eq!(s.orchestration.aggregation_timeout_secs, 600);
        assert_eq!(s.fetcher.filter_attempts, 3);
        assert_eq!(s.fetcher.filter_retry_delay_ms, 2000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let s: Settings = toml::from_str(
            r#"
            [orchestration]
            max_concurrent_jobs = 8

            [fetcher]
            filter_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(s.orchestration.max_concurrent_jobs, 8);
        assert_eq!(s.orchestration.max_child_jobs, 50);
        assert_eq!(s.fetcher.filter_attempts, 5);
        assert_eq!(s.fetcher.scroll_passes, 2);
    }
}
