//! End-to-end orchestration tests over a stub fetcher.
//!
//! Everything here runs on paused time: poll ticks, batch delays, and
//! deadlines advance instantly once the runtime is otherwise idle.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use promoscrape::cache::ResultCache;
use promoscrape::config::OrchestrationConfig;
use promoscrape::error::ScrapeError;
use promoscrape::models::{
    CampaignResult, DiscountType, Job, JobStatus, JobType, ScrapeRequest,
};
use promoscrape::orchestrator::{OverallStatus, ScrapeOrchestrator};
use promoscrape::scheduler::JobScheduler;
use promoscrape::scrapers::{CampaignFetcher, FetchTarget};
use promoscrape::storage::{FileStore, KeyValueStore};

/// Scripted fetcher: per-subcategory item lists, selectable failures,
/// optional per-fetch delay.
struct StubFetcher {
    subcategories: Vec<String>,
    items: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    fetch_delay: Duration,
    fetch_calls: AtomicUsize,
}

impl StubFetcher {
    fn new() -> Self {
        Self {
            subcategories: Vec::new(),
            items: HashMap::new(),
            failing: HashSet::new(),
            fetch_delay: Duration::from_millis(10),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    fn with_subcategories(mut self, subs: &[&str]) -> Self {
        self.subcategories = subs.iter().map(|s| s.to_string()).collect();
        self
    }

    fn with_items(mut self, subcategory: &str, items: &[&str]) -> Self {
        self.items.insert(
            subcategory.to_string(),
            items.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    fn failing_on(mut self, subcategory: &str) -> Self {
        self.failing.insert(subcategory.to_string());
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CampaignFetcher for StubFetcher {
    async fn fetch(&self, target: &FetchTarget) -> Result<CampaignResult, ScrapeError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.fetch_delay).await;

        let sub = target.subcategory.clone().unwrap_or_default();
        if self.failing.contains(&sub) {
            return Err(ScrapeError::Automation(format!(
                "scripted failure for '{sub}'"
            )));
        }

        let mut result = CampaignResult::new(
            target.campaign_id.clone(),
            "20% off everything".into(),
            String::new(),
            DiscountType::Percentage,
            20.0,
        );
        result.item_ids = self.items.get(&sub).cloned().unwrap_or_default();
        Ok(result)
    }

    async fn discover_subcategories(&self, _campaign_id: &str, _category: &str) -> Vec<String> {
        self.subcategories.clone()
    }
}

struct Harness {
    _tmp: TempDir,
    scheduler: Arc<JobScheduler>,
    cache: Arc<ResultCache>,
    orchestrator: ScrapeOrchestrator,
}

fn harness(fetcher: Arc<StubFetcher>, config: OrchestrationConfig) -> Harness {
    let tmp = TempDir::new().unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(tmp.path()));
    let scheduler = Arc::new(JobScheduler::new(store.clone(), config.max_concurrent_jobs));
    let cache = Arc::new(ResultCache::new(store));
    let orchestrator = ScrapeOrchestrator::new(
        scheduler.clone(),
        fetcher,
        cache.clone(),
        config,
    );
    Harness {
        _tmp: tmp,
        scheduler,
        cache,
        orchestrator,
    }
}

fn fast_config() -> OrchestrationConfig {
    OrchestrationConfig {
        max_concurrent_jobs: 4,
        child_batch_size: 5,
        child_batch_delay_ms: 10,
        aggregation_poll_secs: 1,
        aggregation_timeout_secs: 300,
        ..Default::default()
    }
}

async fn wait_terminal(scheduler: &JobScheduler, job_id: &str) -> Job {
    loop {
        if let Some(job) = scheduler.get(job_id).await {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn request(
    campaign: &str,
    category: Option<&str>,
    subcategory: Option<&str>,
) -> ScrapeRequest {
    ScrapeRequest::new(
        campaign,
        category.map(String::from),
        subcategory.map(String::from),
        None,
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn single_scrape_completes_and_caches() {
    let fetcher = Arc::new(StubFetcher::new().with_items("shoes", &["i1", "i2"]));
    let h = harness(fetcher.clone(), fast_config());

    let req = request("spring24", Some("apparel"), Some("shoes"));
    let job = h.orchestrator.submit_scrape(&req).await;
    assert_eq!(job.job_type, JobType::Scrape);

    let done = wait_terminal(&h.scheduler, &job.id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.result.as_ref().unwrap().item_ids, vec!["i1", "i2"]);

    let cached = h.cache.get(&req.cache_key()).await.unwrap();
    assert_eq!(cached.item_ids, vec!["i1", "i2"]);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_request_reuses_active_job() {
    let fetcher = Arc::new(
        StubFetcher::new()
            .with_items("shoes", &["i1"])
            .with_delay(Duration::from_secs(60)),
    );
    let h = harness(fetcher.clone(), fast_config());

    let req = request("spring24", Some("apparel"), Some("shoes"));
    let first = h.orchestrator.submit_scrape(&req).await;
    let second = h.orchestrator.submit_scrape(&req).await;
    assert_eq!(first.id, second.id);

    // A different tuple is not deduplicated.
    let other = request("spring24", Some("apparel"), Some("hats"));
    let third = h.orchestrator.submit_scrape(&other).await;
    assert_ne!(first.id, third.id);
}

#[tokio::test(start_paused = true)]
async fn failed_job_does_not_block_resubmission() {
    let fetcher = Arc::new(StubFetcher::new().failing_on("shoes"));
    let h = harness(fetcher.clone(), fast_config());

    let req = request("spring24", Some("apparel"), Some("shoes"));
    let first = h.orchestrator.submit_scrape(&req).await;
    let failed = wait_terminal(&h.scheduler, &first.id).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.unwrap().contains("scripted failure"));

    let retry = h.orchestrator.submit_scrape(&req).await;
    assert_ne!(first.id, retry.id);
}

#[tokio::test(start_paused = true)]
async fn fan_out_aggregates_union_of_item_ids() {
    let fetcher = Arc::new(
        StubFetcher::new()
            .with_subcategories(&["a", "b", "c"])
            .with_items("a", &["i1", "i2"])
            .with_items("b", &["i2", "i3"])
            .failing_on("c"),
    );
    let h = harness(fetcher.clone(), fast_config());

    let req = request("summer24", Some("grocery"), None);
    let parent = h.orchestrator.submit_scrape(&req).await;
    assert_eq!(parent.job_type, JobType::Orchestrator);

    let done = wait_terminal(&h.scheduler, &parent.id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(
        done.result.as_ref().unwrap().item_ids,
        vec!["i1", "i2", "i3"]
    );

    let child_ids = done.metadata.child_job_ids.as_ref().unwrap();
    assert_eq!(child_ids.len(), 3);
    for id in child_ids {
        let child = h.scheduler.get(id).await.unwrap();
        assert_eq!(child.metadata.parent_job_id.as_deref(), Some(parent.id.as_str()));
    }

    // One child failed, so the campaign as a whole is partial.
    let view = h.orchestrator.get_jobs_for_campaign("summer24").await;
    assert_eq!(view.overall_status, OverallStatus::Partial);
    assert_eq!(view.summary.failed, 1);

    // The aggregate is served from the cache under the parent's key.
    let cached = h.cache.get(&req.cache_key()).await.unwrap();
    assert_eq!(cached.item_ids, vec!["i1", "i2", "i3"]);
}

#[tokio::test(start_paused = true)]
async fn empty_discovery_degrades_to_one_unfiltered_child() {
    let fetcher = Arc::new(StubFetcher::new().with_items("", &["i9"]));
    let h = harness(fetcher.clone(), fast_config());

    let req = request("fall24", Some("outdoor"), None);
    let parent = h.orchestrator.submit_scrape(&req).await;

    let done = wait_terminal(&h.scheduler, &parent.id).await;
    assert_eq!(done.status, JobStatus::Completed);

    let child_ids = done.metadata.child_job_ids.as_ref().unwrap();
    assert_eq!(child_ids.len(), 1);
    let child = h.scheduler.get(&child_ids[0]).await.unwrap();
    assert_eq!(child.metadata.subcategory, None);
    assert_eq!(done.result.as_ref().unwrap().item_ids, vec!["i9"]);
}

#[tokio::test(start_paused = true)]
async fn discovery_width_is_capped() {
    let subs: Vec<String> = (0..80).map(|i| format!("sub{i:02}")).collect();
    let sub_refs: Vec<&str> = subs.iter().map(String::as_str).collect();
    let mut fetcher = StubFetcher::new().with_subcategories(&sub_refs);
    for sub in &subs {
        fetcher = fetcher.with_items(sub, &[]);
    }
    let fetcher = Arc::new(fetcher);

    let mut config = fast_config();
    config.max_child_jobs = 50;
    config.max_concurrent_jobs = 8;
    let h = harness(fetcher.clone(), config);

    let req = request("mega24", Some("everything"), None);
    let parent = h.orchestrator.submit_scrape(&req).await;
    let done = wait_terminal(&h.scheduler, &parent.id).await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.metadata.child_job_ids.unwrap().len(), 50);
    // 50 child fetches, none for the parent.
    assert_eq!(fetcher.calls(), 50);
}

#[tokio::test(start_paused = true)]
async fn aggregation_times_out_when_children_never_settle() {
    let fetcher = Arc::new(
        StubFetcher::new()
            .with_subcategories(&["slow"])
            .with_items("slow", &["i1"])
            .with_delay(Duration::from_secs(3600)),
    );
    let mut config = fast_config();
    config.aggregation_timeout_secs = 30;
    let h = harness(fetcher.clone(), config);

    let req = request("stuck24", Some("grocery"), None);
    let parent = h.orchestrator.submit_scrape(&req).await;
    let done = wait_terminal(&h.scheduler, &parent.id).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert!(done.error.unwrap().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn all_children_failing_fails_the_parent() {
    let fetcher = Arc::new(
        StubFetcher::new()
            .with_subcategories(&["a", "b"])
            .failing_on("a")
            .failing_on("b"),
    );
    let h = harness(fetcher.clone(), fast_config());

    let req = request("doomed24", Some("grocery"), None);
    let parent = h.orchestrator.submit_scrape(&req).await;
    let done = wait_terminal(&h.scheduler, &parent.id).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert!(done.error.unwrap().contains("all child jobs failed"));
}

#[tokio::test(start_paused = true)]
async fn cached_result_expires_by_ttl() {
    let fetcher = Arc::new(StubFetcher::new().with_items("shoes", &["i1"]));
    let mut config = fast_config();
    config.result_ttl_secs = 1;
    let h = harness(fetcher.clone(), config);

    let req = request("ttl24", Some("apparel"), Some("shoes"));
    let job = h.orchestrator.submit_scrape(&req).await;
    wait_terminal(&h.scheduler, &job.id).await;
    assert!(h.orchestrator.cached_result(&req).await.is_some());

    // Absolute expiry is wall-clock, not tokio time, so wait it out.
    tokio::time::resume();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(h.orchestrator.cached_result(&req).await.is_none());
}
