//! Validated scrape requests.

use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;

use super::JobMetadata;

pub const MIN_LOAD_MORE_CLICKS: u32 = 1;
pub const MAX_LOAD_MORE_CLICKS: u32 = 50;
pub const DEFAULT_LOAD_MORE_CLICKS: u32 = 5;

/// An immutable, validated request for one campaign scrape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    campaign_id: String,
    category: Option<String>,
    subcategory: Option<String>,
    max_load_more_clicks: u32,
}

impl ScrapeRequest {
    /// Validate and construct a request.
    ///
    /// Campaign ids are alphanumeric; a subcategory without a category is a
    /// caller error; the click budget is clamped to its documented bounds by
    /// rejection, not silent adjustment.
    pub fn new(
        campaign_id: impl Into<String>,
        category: Option<String>,
        subcategory: Option<String>,
        max_load_more_clicks: Option<u32>,
    ) -> Result<Self, ScrapeError> {
        let campaign_id = campaign_id.into();
        if campaign_id.is_empty() || !campaign_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ScrapeError::Validation(format!(
                "campaign id must be non-empty and alphanumeric, got '{campaign_id}'"
            )));
        }

        let category = category.filter(|s| !s.is_empty());
        let subcategory = subcategory.filter(|s| !s.is_empty());
        if subcategory.is_some() && category.is_none() {
            return Err(ScrapeError::Validation(
                "subcategory requires a category".into(),
            ));
        }

        let clicks = max_load_more_clicks.unwrap_or(DEFAULT_LOAD_MORE_CLICKS);
        if !(MIN_LOAD_MORE_CLICKS..=MAX_LOAD_MORE_CLICKS).contains(&clicks) {
            return Err(ScrapeError::Validation(format!(
                "max_load_more_clicks must be between {MIN_LOAD_MORE_CLICKS} and {MAX_LOAD_MORE_CLICKS}, got {clicks}"
            )));
        }

        Ok(Self {
            campaign_id,
            category,
            subcategory,
            max_load_more_clicks: clicks,
        })
    }

    pub fn campaign_id(&self) -> &str {
        &self.campaign_id
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn subcategory(&self) -> Option<&str> {
        self.subcategory.as_deref()
    }

    pub fn max_load_more_clicks(&self) -> u32 {
        self.max_load_more_clicks
    }

    /// True when this request should fan out into per-subcategory children.
    pub fn wants_fan_out(&self) -> bool {
        self.category.is_some() && self.subcategory.is_none()
    }

    /// Stable key shared by dedup lookups and the result cache.
    pub fn cache_key(&self) -> String {
        self.job_metadata().correlation_key()
    }

    /// Correlation metadata for the job this request becomes.
    pub fn job_metadata(&self) -> JobMetadata {
        JobMetadata {
            campaign_id: self.campaign_id.clone(),
            category: self.category.clone(),
            subcategory: self.subcategory.clone(),
            max_load_more_clicks: self.max_load_more_clicks,
            parent_job_id: None,
            child_job_ids: None,
        }
    }

    /// Derive the request for one child of a fan-out.
    pub fn for_subcategory(&self, subcategory: &str) -> Self {
        Self {
            campaign_id: self.campaign_id.clone(),
            category: self.category.clone(),
            subcategory: if subcategory.is_empty() {
                None
            } else {
                Some(subcategory.to_string())
            },
            max_load_more_clicks: self.max_load_more_clicks,
        }
    }
}
