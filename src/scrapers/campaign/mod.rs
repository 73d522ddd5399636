//! Campaign target fetching.
//!
//! [`CampaignFetcher`] is the seam between orchestration and browser
//! automation: the orchestrator only ever sees this trait, which keeps the
//! fan-out and aggregation logic testable without a browser.

mod discovery;
mod fetch;
mod signals;

pub use discovery::filter_subcategory_noise;
pub use signals::best_estimate;

use async_trait::async_trait;

use crate::error::ScrapeError;
use crate::models::CampaignResult;

/// One (campaign, category, subcategory) scrape target.
#[derive(Debug, Clone)]
pub struct FetchTarget {
    pub campaign_id: String,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub max_load_more_clicks: u32,
}

/// Drives one browser session per call; returns a normalized result or a
/// typed failure.
#[async_trait]
pub trait CampaignFetcher: Send + Sync {
    /// Full scrape of a single target.
    async fn fetch(&self, target: &FetchTarget) -> Result<CampaignResult, ScrapeError>;

    /// Discovery mode: list subcategory labels for a category.
    ///
    /// Never errors; any failure degrades to an empty list, which the
    /// orchestrator absorbs by falling back to one unfiltered child.
    async fn discover_subcategories(&self, campaign_id: &str, category: &str) -> Vec<String>;
}

pub use fetch::BrowserCampaignFetcher;
