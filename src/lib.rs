//! PromoScrape - promotional-campaign scraping and job orchestration.
//!
//! Submits scrape jobs for retailer campaign pages, fans large campaigns out
//! into per-subcategory child jobs, aggregates their results, and serves
//! repeat requests from a TTL cache backed by file storage.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod scheduler;
pub mod scrapers;
pub mod storage;
pub mod utils;

pub use error::{Result, ScrapeError};
