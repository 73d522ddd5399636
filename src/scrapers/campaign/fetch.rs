//! Browser-driven campaign fetch state machine.
//!
//! One fetch walks navigate -> content-wait -> [filter] -> load-more ->
//! scroll -> extract, with the session torn down on every exit path. The
//! content-wait and load-more growth waits are soft (warn and continue);
//! filter application is hard (a silently-unfiltered result would be a
//! correctness hazard for callers who asked for a subcategory).

use urlencoding::encode;

use crate::error::ScrapeError;

/// The error reported after filter activation exhausts its retries. Names
/// the subcategory so callers can tell which filter never took.
pub(crate) fn filter_failure(subcategory: &str, attempts: u32) -> ScrapeError {
    ScrapeError::Automation(format!(
        "failed to apply filter '{subcategory}' after {attempts} attempts"
    ))
}

/// Build the campaign URL, optionally with a category query parameter.
pub fn campaign_url(base: &str, campaign_id: &str, category: Option<&str>) -> String {
    let base = base.trim_end_matches('/');
    match category {
        Some(cat) if !cat.is_empty() => {
            format!("{base}/{campaign_id}?category={}", encode(cat))
        }
        _ => format!("{base}/{campaign_id}"),
    }
}

#[cfg(feature = "browser")]
pub use with_browser::BrowserCampaignFetcher;

#[cfg(feature = "browser")]
mod with_browser {
    use async_trait::async_trait;
    use chromiumoxide::Page;
    use tokio::sync::Mutex;
    use tokio::time::{sleep, timeout, Duration, Instant};
    use tracing::{debug, info, warn};

    use crate::config::FetcherConfig;
    use crate::error::ScrapeError;
    use crate::models::CampaignResult;
    use crate::scrapers::browser::{BrowserEngineConfig, BrowserFetcher};
    use crate::scrapers::extract;
    use crate::utils::retry::with_retries;

    use super::super::discovery::{
        filter_subcategory_noise, is_detached_context_error, DISCOVERY_JS,
    };
    use super::super::signals::{best_estimate, CONTENT_PROBES, SCROLL_TO_BOTTOM, SCROLL_TO_TOP};
    use super::super::{CampaignFetcher, FetchTarget};
    use super::campaign_url;

    /// Landmark confirming the campaign header rendered.
    const TITLE_LANDMARK: &str = "[data-campaign-title], .campaign-title, .promo-headline, h1";

    /// Stable load-more selectors, tried before the text fallback.
    const LOAD_MORE_SELECTOR: &str = "[data-testid=\"load-more\"], #load-more, button.load-more";

    pub struct BrowserCampaignFetcher {
        browser: Mutex<BrowserFetcher>,
        config: FetcherConfig,
    }

    impl BrowserCampaignFetcher {
        pub fn new(browser_config: BrowserEngineConfig, config: FetcherConfig) -> Self {
            Self {
                browser: Mutex::new(BrowserFetcher::new(browser_config)),
                config,
            }
        }

        async fn open_page(&self, url: &str) -> Result<Page, ScrapeError> {
            let mut browser = self.browser.lock().await;
            browser
                .new_page(url)
                .await
                .map_err(|e| ScrapeError::Automation(format!("navigation to {url}: {e}")))
        }

        /// Close the session; failures here only get logged.
        async fn teardown(page: Page) {
            if let Err(e) = page.close().await {
                warn!("Failed to close page: {}", e);
            }
        }

        /// Bounded wait for the title landmark. Non-fatal: the page may use
        /// an unfamiliar layout and still carry usable content.
        async fn content_wait(&self, page: &Page) {
            let waited = timeout(self.config.content_wait(), async {
                loop {
                    if page.find_element(TITLE_LANDMARK).await.is_ok() {
                        return;
                    }
                    sleep(Duration::from_millis(250)).await;
                }
            })
            .await;
            if waited.is_err() {
                warn!(
                    "Title landmark did not appear within {}s, continuing with current DOM",
                    self.config.content_wait_secs
                );
            }
        }

        /// Activate the subcategory filter control, preferring the stable
        /// data attribute over exact text.
        async fn apply_filter_once(&self, page: &Page, subcategory: &str) -> Result<(), String> {
            // JSON-encode to get a safe JS string literal.
            let literal = serde_json::to_string(subcategory).map_err(|e| e.to_string())?;
            let script = format!(
                r#"
                (() => {{
                    const target = {literal};
                    let el = document.querySelector('[data-filter-value="' + CSS.escape(target) + '"]');
                    if (!el) {{
                        el = Array.from(document.querySelectorAll(
                            '.filter-panel li, .filter-panel label, [class*="FilterOption"]'
                        )).find(e => e.textContent.trim() === target);
                    }}
                    if (!el) return false;
                    el.click();
                    return true;
                }})()
                "#
            );
            let clicked: bool = page
                .evaluate(script)
                .await
                .map_err(|e| e.to_string())?
                .into_value()
                .map_err(|e| format!("{e:?}"))?;
            if clicked {
                Ok(())
            } else {
                Err(format!("no filter control matched '{subcategory}'"))
            }
        }

        async fn apply_filter(&self, page: &Page, subcategory: &str) -> Result<(), ScrapeError> {
            let attempts = self.config.filter_attempts;
            with_retries(
                attempts,
                self.config.filter_retry_delay(),
                "filter activation",
                |_| self.apply_filter_once(page, subcategory),
            )
            .await
            .map_err(|_| super::filter_failure(subcategory, attempts))
        }

        /// Current best estimate of rendered items, max across probes.
        async fn estimate_items(&self, page: &Page) -> u64 {
            let mut counts = Vec::with_capacity(CONTENT_PROBES.len());
            for probe in CONTENT_PROBES {
                let count = page
                    .evaluate(probe.to_string())
                    .await
                    .ok()
                    .and_then(|v| v.into_value::<u64>().ok())
                    .unwrap_or(0);
                counts.push(count);
            }
            best_estimate(&counts)
        }

        /// Try to click a load-more control. `false` means none exists,
        /// which ends the loop normally.
        async fn click_load_more(&self, page: &Page) -> Result<bool, ScrapeError> {
            let script = format!(
                r#"
                (() => {{
                    const inFilter = (el) =>
                        el.closest('.filter-panel, [data-filter-group], [class*="FilterExpander"]') !== null;
                    let btn = document.querySelector('{LOAD_MORE_SELECTOR}');
                    if (!btn) {{
                        btn = Array.from(document.querySelectorAll('button, a')).find(
                            el => !inFilter(el) && /\b(load|show)\s+more\b/i.test(el.textContent)
                        );
                    }}
                    if (!btn || inFilter(btn)) return false;
                    btn.click();
                    return true;
                }})()
                "#
            );
            page.evaluate(script)
                .await
                .map_err(|e| ScrapeError::Automation(format!("load-more click: {e}")))?
                .into_value()
                .map_err(|e| ScrapeError::Automation(format!("load-more click result: {e:?}")))
        }

        /// Incrementally reveal content, bounded by the caller's click budget.
        async fn load_more_loop(&self, page: &Page, max_clicks: u32) -> Result<u64, ScrapeError> {
            let mut estimate = self.estimate_items(page).await;

            for click in 1..=max_clicks {
                self.scroll(page, SCROLL_TO_BOTTOM).await;

                if !self.click_load_more(page).await? {
                    debug!("No load-more control after {} clicks, done", click - 1);
                    return Ok(estimate);
                }

                // Bounded wait for the estimate to grow. Some increments
                // legitimately add nothing, so a non-increase is soft.
                let deadline = Instant::now() + self.config.growth_wait();
                let before = estimate;
                while Instant::now() < deadline {
                    sleep(Duration::from_millis(250)).await;
                    estimate = self.estimate_items(page).await;
                    if estimate > before {
                        break;
                    }
                }
                if estimate <= before {
                    warn!(
                        "Item estimate stayed at {} after load-more click {}",
                        before, click
                    );
                }
            }

            info!("Reached load-more click cap ({} clicks)", max_clicks);
            Ok(estimate)
        }

        async fn scroll(&self, page: &Page, script: &str) {
            if let Err(e) = page.evaluate(script.to_string()).await {
                debug!("Scroll evaluation failed: {}", e);
            }
            sleep(self.config.scroll_settle()).await;
        }

        /// Everything between navigation and extraction, on an open page.
        async fn run(&self, page: &Page, target: &FetchTarget) -> Result<CampaignResult, ScrapeError> {
            if let Err(e) = page.wait_for_navigation().await {
                // Relaxed condition: continuous background requests keep
                // these pages from ever reaching network idle.
                debug!("Navigation wait ended early: {}", e);
            }

            self.content_wait(page).await;

            if let Some(ref subcategory) = target.subcategory {
                self.apply_filter(page, subcategory).await?;
            }

            let estimate = self
                .load_more_loop(page, target.max_load_more_clicks)
                .await?;
            debug!("Load-more loop finished with ~{} items", estimate);

            for _ in 0..self.config.scroll_passes {
                self.scroll(page, SCROLL_TO_BOTTOM).await;
                self.scroll(page, SCROLL_TO_TOP).await;
            }

            let html = page
                .content()
                .await
                .map_err(|e| ScrapeError::Automation(format!("document capture: {e}")))?;

            extract::parse_campaign(&html, &target.campaign_id)
        }

        async fn discover_once(
            &self,
            campaign_id: &str,
            category: &str,
        ) -> Result<Vec<String>, String> {
            let url = campaign_url(&self.config.base_url, campaign_id, Some(category));
            let page = self.open_page(&url).await.map_err(|e| e.to_string())?;

            let result = async {
                if let Err(e) = page.wait_for_navigation().await {
                    debug!("Navigation wait ended early: {}", e);
                }
                self.content_wait(&page).await;
                page.evaluate(DISCOVERY_JS.to_string())
                    .await
                    .map_err(|e| e.to_string())?
                    .into_value::<Vec<String>>()
                    .map_err(|e| format!("{e:?}"))
            }
            .await;

            Self::teardown(page).await;
            result
        }
    }

    #[async_trait]
    impl CampaignFetcher for BrowserCampaignFetcher {
        async fn fetch(&self, target: &FetchTarget) -> Result<CampaignResult, ScrapeError> {
            let url = campaign_url(
                &self.config.base_url,
                &target.campaign_id,
                target.category.as_deref(),
            );
            info!("Fetching campaign {} from {}", target.campaign_id, url);

            let page = self.open_page(&url).await?;
            let result = self.run(&page, target).await;
            Self::teardown(page).await;
            result
        }

        async fn discover_subcategories(&self, campaign_id: &str, category: &str) -> Vec<String> {
            let mut attempt = 0u32;
            loop {
                match self.discover_once(campaign_id, category).await {
                    Ok(labels) => {
                        let labels = filter_subcategory_noise(labels);
                        info!(
                            "Discovered {} subcategories for {}/{}",
                            labels.len(),
                            campaign_id,
                            category
                        );
                        return labels;
                    }
                    Err(e) if is_detached_context_error(&e)
                        && attempt < self.config.discovery_retries =>
                    {
                        attempt += 1;
                        warn!(
                            "Discovery context detached (retry {}/{}): {}",
                            attempt, self.config.discovery_retries, e
                        );
                        sleep(self.config.discovery_retry_delay()).await;
                    }
                    Err(e) => {
                        warn!(
                            "Discovery failed for {}/{}, treating as no subcategories: {}",
                            campaign_id, category, e
                        );
                        return Vec::new();
                    }
                }
            }
        }
    }
}

// Stub for when the browser feature is disabled.
#[cfg(not(feature = "browser"))]
pub struct BrowserCampaignFetcher;

#[cfg(not(feature = "browser"))]
impl BrowserCampaignFetcher {
    pub fn new(
        _browser_config: crate::scrapers::browser::BrowserEngineConfig,
        _config: crate::config::FetcherConfig,
    ) -> Self {
        Self
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl super::CampaignFetcher for BrowserCampaignFetcher {
    async fn fetch(
        &self,
        _target: &super::FetchTarget,
    ) -> Result<crate::models::CampaignResult, crate::error::ScrapeError> {
        Err(crate::error::ScrapeError::Infrastructure(
            "browser support not compiled; rebuild with --features browser".into(),
        ))
    }

    async fn discover_subcategories(&self, _campaign_id: &str, _category: &str) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_without_category() {
        assert_eq!(
            campaign_url("https://shop.test/campaigns", "summer24", None),
            "https://shop.test/campaigns/summer24"
        );
    }

    #[test]
    fn url_with_category_is_encoded() {
        assert_eq!(
            campaign_url("https://shop.test/campaigns/", "summer24", Some("frozen foods")),
            "https://shop.test/campaigns/summer24?category=frozen%20foods"
        );
    }

    #[test]
    fn filter_failure_names_the_subcategory() {
        let err = filter_failure("frozen foods", 3);
        let msg = err.to_string();
        assert!(msg.contains("frozen foods"));
        assert!(msg.contains("3 attempts"));
    }

    #[test]
    fn empty_category_is_ignored() {
        assert_eq!(
            campaign_url("https://shop.test/campaigns", "summer24", Some("")),
            "https://shop.test/campaigns/summer24"
        );
    }
}
