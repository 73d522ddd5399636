//! Scraper implementations for campaign pages.

pub mod browser;
pub mod campaign;
pub mod extract;

pub use browser::{BrowserEngineConfig, BrowserFetcher};
pub use campaign::{BrowserCampaignFetcher, CampaignFetcher, FetchTarget};
