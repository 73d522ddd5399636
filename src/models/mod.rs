//! Data models for promoscrape.

mod campaign;
mod job;
mod request;

pub use campaign::{CampaignResult, DiscountType};
pub use job::{Job, JobMetadata, JobProgress, JobStatus, JobType};
pub use request::ScrapeRequest;
