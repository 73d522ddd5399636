//! Shared wiring for CLI commands.

use std::sync::Arc;

use tracing::info;

use crate::cache::ResultCache;
use crate::config::Settings;
use crate::orchestrator::ScrapeOrchestrator;
use crate::scheduler::JobScheduler;
use crate::scrapers::{BrowserCampaignFetcher, CampaignFetcher};
use crate::storage::{FileStore, KeyValueStore};

/// Everything a command needs, wired against one data directory.
pub struct AppContext {
    pub scheduler: Arc<JobScheduler>,
    pub cache: Arc<ResultCache>,
    pub orchestrator: ScrapeOrchestrator,
}

/// Build the full stack: file store, scheduler, cache, fetcher, orchestrator.
///
/// Rehydrates jobs and cache entries from the durable store on the way up,
/// so restarts see prior terminal jobs and unexpired results.
pub async fn build_context(settings: Settings) -> anyhow::Result<AppContext> {
    let data_dir = settings.data_dir();
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&data_dir));

    let scheduler = Arc::new(JobScheduler::new(
        store.clone(),
        settings.orchestration.max_concurrent_jobs,
    ));
    let jobs = scheduler.load_from_storage().await?;
    if jobs > 0 {
        info!("Rehydrated {} jobs from {}", jobs, data_dir.display());
    }

    let cache = Arc::new(ResultCache::new(store));
    let entries = cache.load_from_storage().await?;
    if entries > 0 {
        info!("Loaded {} cached results", entries);
    }

    let fetcher: Arc<dyn CampaignFetcher> = Arc::new(BrowserCampaignFetcher::new(
        settings.browser.clone(),
        settings.fetcher.clone(),
    ));

    let orchestrator = ScrapeOrchestrator::new(
        scheduler.clone(),
        fetcher,
        cache.clone(),
        settings.orchestration,
    );

    Ok(AppContext {
        scheduler,
        cache,
        orchestrator,
    })
}
