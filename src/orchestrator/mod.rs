//! Scrape orchestration: dedup, routing, fan-out, aggregation.
//!
//! Fan-out is a two-phase protocol. Phase 1 creates the parent job and
//! returns it to the caller synchronously; its work function is the
//! aggregation wait-loop, parameterized by its own job id. Phase 2 runs as a
//! detached task: it discovers subcategories, creates child jobs in throttled
//! batches, and publishes the fan-out width by patching the parent's
//! metadata, which the aggregation loop polls.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::config::OrchestrationConfig;
use crate::error::ScrapeError;
use crate::models::{
    CampaignResult, Job, JobProgress, JobStatus, JobType, ScrapeRequest,
};
use crate::scheduler::{JobConfig, JobScheduler, MetadataPatch};
use crate::scrapers::{CampaignFetcher, FetchTarget};

/// Derived status across every job of one campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Partial,
}

/// Campaign-wide job view for the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignJobs {
    pub jobs: Vec<Job>,
    pub overall_status: OverallStatus,
    pub summary: JobSummary,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct JobSummary {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// The use case deciding how an incoming request becomes jobs.
pub struct ScrapeOrchestrator {
    scheduler: Arc<JobScheduler>,
    fetcher: Arc<dyn CampaignFetcher>,
    cache: Arc<ResultCache>,
    config: OrchestrationConfig,
}

impl ScrapeOrchestrator {
    pub fn new(
        scheduler: Arc<JobScheduler>,
        fetcher: Arc<dyn CampaignFetcher>,
        cache: Arc<ResultCache>,
        config: OrchestrationConfig,
    ) -> Self {
        Self {
            scheduler,
            fetcher,
            cache,
            config,
        }
    }

    /// Submit a scrape request; always returns a job handle synchronously.
    ///
    /// An existing non-failed job for the same correlation key is returned
    /// untouched, guaranteeing at most one active job per tuple.
    pub async fn submit_scrape(&self, request: &ScrapeRequest) -> Job {
        if let Some(existing) = self
            .scheduler
            .find_by_correlation(
                request.campaign_id(),
                request.category(),
                request.subcategory(),
            )
            .await
        {
            debug!(
                "Deduplicated request for {} onto job {}",
                request.cache_key(),
                existing.id
            );
            return existing;
        }

        if request.wants_fan_out() {
            self.submit_fan_out(request).await
        } else {
            let metadata = request.job_metadata();
            let work = self.single_scrape_work(request.clone());
            self.scheduler
                .submit_boxed(JobType::Scrape, metadata, work)
                .await
        }
    }

    pub async fn get_job(&self, job_id: &str) -> Option<Job> {
        self.scheduler.get(job_id).await
    }

    /// All jobs for a campaign plus a derived overall status.
    pub async fn get_jobs_for_campaign(&self, campaign_id: &str) -> CampaignJobs {
        let jobs = self.scheduler.find_all_by_campaign(campaign_id).await;
        let mut summary = JobSummary::default();
        for job in &jobs {
            match job.status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::Running => summary.running += 1,
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
            }
        }
        CampaignJobs {
            overall_status: derive_overall(&summary, jobs.len()),
            jobs,
            summary,
        }
    }

    /// Read-through lookup of a previously cached result.
    pub async fn cached_result(&self, request: &ScrapeRequest) -> Option<CampaignResult> {
        self.cache.get(&request.cache_key()).await
    }

    fn single_scrape_work(&self, request: ScrapeRequest) -> crate::scheduler::WorkFn {
        let fetcher = Arc::clone(&self.fetcher);
        let cache = Arc::clone(&self.cache);
        let ttl = self.config.result_ttl_secs;
        Box::new(move |_job_id| {
            Box::pin(async move {
                let target = FetchTarget {
                    campaign_id: request.campaign_id().to_string(),
                    category: request.category().map(String::from),
                    subcategory: request.subcategory().map(String::from),
                    max_load_more_clicks: request.max_load_more_clicks(),
                };
                let result = fetcher.fetch(&target).await?;
                cache.set(&request.cache_key(), result.clone(), ttl).await;
                Ok(result)
            })
        })
    }

    /// Phase 1: create the parent and return it; spawn phase 2 detached.
    async fn submit_fan_out(&self, request: &ScrapeRequest) -> Job {
        let parent = self
            .scheduler
            .submit_boxed(
                JobType::Orchestrator,
                request.job_metadata(),
                self.aggregation_work(request.clone()),
            )
            .await;

        let scheduler = Arc::clone(&self.scheduler);
        let fetcher = Arc::clone(&self.fetcher);
        let cache = Arc::clone(&self.cache);
        let config = self.config.clone();
        let request = request.clone();
        let parent_id = parent.id.clone();

        tokio::spawn(async move {
            spawn_children(scheduler, fetcher, cache, config, request, parent_id).await;
        });

        parent
    }

    /// The parent job's own work function: poll children until they settle,
    /// then aggregate.
    fn aggregation_work(&self, request: ScrapeRequest) -> crate::scheduler::WorkFn {
        let scheduler = Arc::clone(&self.scheduler);
        let cache = Arc::clone(&self.cache);
        let config = self.config.clone();
        Box::new(move |job_id| {
            Box::pin(async move {
                let result =
                    aggregation_loop(&scheduler, &config, &job_id).await?;
                cache
                    .set(&request.cache_key(), result.clone(), config.result_ttl_secs)
                    .await;
                Ok(result)
            })
        })
    }
}

/// Phase 2 of fan-out: discovery, batched child creation, metadata patch.
async fn spawn_children(
    scheduler: Arc<JobScheduler>,
    fetcher: Arc<dyn CampaignFetcher>,
    cache: Arc<ResultCache>,
    config: OrchestrationConfig,
    request: ScrapeRequest,
    parent_id: String,
) {
    let category = request.category().unwrap_or_default().to_string();
    let mut subcategories = fetcher
        .discover_subcategories(request.campaign_id(), &category)
        .await;

    if subcategories.is_empty() {
        // Legitimate for sparse categories: degrade to one unfiltered child.
        info!(
            "No subcategories discovered for {}/{}, creating one unfiltered child",
            request.campaign_id(),
            category
        );
        subcategories.push(String::new());
    } else if subcategories.len() > config.max_child_jobs {
        warn!(
            "Discovery returned {} subcategories for {}/{}, truncating to {}",
            subcategories.len(),
            request.campaign_id(),
            category,
            config.max_child_jobs
        );
        subcategories.truncate(config.max_child_jobs);
    }

    let mut child_ids = Vec::with_capacity(subcategories.len());
    let batch_size = config.child_batch_size.max(1);
    let mut first_batch = true;

    for batch in subcategories.chunks(batch_size) {
        if !first_batch {
            // Let the automation backend breathe between bursts.
            sleep(config.child_batch_delay()).await;
        }
        first_batch = false;

        let configs: Vec<JobConfig> = batch
            .iter()
            .map(|subcategory| {
                let child_request = request.for_subcategory(subcategory);
                let mut metadata = child_request.job_metadata();
                metadata.parent_job_id = Some(parent_id.clone());

                let fetcher = Arc::clone(&fetcher);
                let cache = Arc::clone(&cache);
                let ttl = config.result_ttl_secs;
                JobConfig {
                    job_type: JobType::Scrape,
                    metadata,
                    work: Box::new(move |_id| {
                        Box::pin(async move {
                            let target = FetchTarget {
                                campaign_id: child_request.campaign_id().to_string(),
                                category: child_request.category().map(String::from),
                                subcategory: child_request.subcategory().map(String::from),
                                max_load_more_clicks: child_request.max_load_more_clicks(),
                            };
                            let result = fetcher.fetch(&target).await?;
                            cache
                                .set(&child_request.cache_key(), result.clone(), ttl)
                                .await;
                            Ok(result)
                        })
                    }),
                }
            })
            .collect();

        let jobs = scheduler.create_batch(configs).await;
        child_ids.extend(jobs.into_iter().map(|j| j.id));
    }

    info!(
        "Fan-out for job {} created {} children",
        parent_id,
        child_ids.len()
    );

    // Publishes the fan-out width to the waiting aggregator.
    scheduler
        .update_metadata(
            &parent_id,
            MetadataPatch {
                child_job_ids: Some(child_ids),
                ..Default::default()
            },
        )
        .await;
}

/// Poll until every child settles, then build the aggregate result.
async fn aggregation_loop(
    scheduler: &JobScheduler,
    config: &OrchestrationConfig,
    parent_id: &str,
) -> Result<CampaignResult, ScrapeError> {
    let deadline = Instant::now() + config.aggregation_timeout();

    loop {
        if Instant::now() >= deadline {
            return Err(ScrapeError::Timeout(format!(
                "aggregation timed out after {}s with unsettled children",
                config.aggregation_timeout_secs
            )));
        }
        sleep(config.aggregation_poll_interval()).await;

        // Re-read our own record: phase 2 publishes children here.
        let Some(parent) = scheduler.get(parent_id).await else {
            return Err(ScrapeError::Infrastructure(format!(
                "parent job {parent_id} disappeared from the store"
            )));
        };
        let Some(child_ids) = parent.metadata.child_job_ids else {
            debug!("Job {}: children still being discovered", parent_id);
            continue;
        };

        let mut children = Vec::with_capacity(child_ids.len());
        for id in &child_ids {
            if let Some(child) = scheduler.get(id).await {
                children.push(child);
            }
        }

        let settled = children.iter().filter(|c| c.status.is_terminal()).count();
        scheduler
            .set_progress(
                parent_id,
                JobProgress {
                    items: settled,
                    message: format!("{settled}/{} children settled", child_ids.len()),
                },
            )
            .await;

        if settled < child_ids.len() || children.len() < child_ids.len() {
            continue;
        }

        return aggregate(&children);
    }
}

/// Merge completed children: shared fields from the first completed child,
/// item ids unioned and deduplicated in first-seen order.
fn aggregate(children: &[Job]) -> Result<CampaignResult, ScrapeError> {
    let completed: Vec<&CampaignResult> = children
        .iter()
        .filter(|c| c.status == JobStatus::Completed)
        .filter_map(|c| c.result.as_ref())
        .collect();

    let Some(first) = completed.first() else {
        return Err(ScrapeError::Automation("all child jobs failed".into()));
    };

    let mut seen = HashSet::new();
    let mut item_ids = Vec::new();
    for result in &completed {
        for id in &result.item_ids {
            if seen.insert(id.clone()) {
                item_ids.push(id.clone());
            }
        }
    }

    let mut aggregated = (*first).clone();
    aggregated.item_ids = item_ids;
    Ok(aggregated)
}

fn derive_overall(summary: &JobSummary, total: usize) -> OverallStatus {
    if total == 0 || summary.pending > 0 {
        OverallStatus::Pending
    } else if summary.running > 0 {
        OverallStatus::Running
    } else if summary.completed == total {
        OverallStatus::Completed
    } else if summary.failed == total {
        OverallStatus::Failed
    } else {
        OverallStatus::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(pending: usize, running: usize, completed: usize, failed: usize) -> JobSummary {
        JobSummary {
            pending,
            running,
            completed,
            failed,
        }
    }

    #[test]
    fn overall_status_derivation() {
        assert_eq!(derive_overall(&summary(1, 0, 2, 0), 3), OverallStatus::Pending);
        assert_eq!(derive_overall(&summary(0, 1, 2, 0), 3), OverallStatus::Running);
        assert_eq!(derive_overall(&summary(0, 0, 3, 0), 3), OverallStatus::Completed);
        assert_eq!(derive_overall(&summary(0, 0, 0, 3), 3), OverallStatus::Failed);
        assert_eq!(derive_overall(&summary(0, 0, 2, 1), 3), OverallStatus::Partial);
        assert_eq!(derive_overall(&summary(0, 0, 0, 0), 0), OverallStatus::Pending);
    }
}
