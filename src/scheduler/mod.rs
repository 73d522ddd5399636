//! Asynchronous job scheduler.
//!
//! Owns the job store, admits work behind a fair semaphore, and records
//! every transition durably. Work functions receive their own job id before
//! execution, so a work function can poll its own record (the orchestrator's
//! aggregation loop relies on this). Work-function errors are captured into
//! the job record and never propagate to the submitter.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::ScrapeError;
use crate::models::{CampaignResult, Job, JobMetadata, JobProgress, JobStatus, JobType};
use crate::storage::KeyValueStore;

/// Storage key prefix for persisted job records.
const JOB_PREFIX: &str = "jobs/";

/// Boxed work function: receives the pre-assigned job id.
pub type WorkFn =
    Box<dyn FnOnce(String) -> BoxFuture<'static, Result<CampaignResult, ScrapeError>> + Send>;

/// One entry of a batch submission.
pub struct JobConfig {
    pub job_type: JobType,
    pub metadata: JobMetadata,
    pub work: WorkFn,
}

/// Aggregate job counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SchedulerStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Fields mergeable into a job's metadata after creation.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    pub parent_job_id: Option<String>,
    pub child_job_ids: Option<Vec<String>>,
}

/// Scheduler for long-running scrape work.
pub struct JobScheduler {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
    admission: Arc<Semaphore>,
    store: Arc<dyn KeyValueStore>,
}

impl JobScheduler {
    pub fn new(store: Arc<dyn KeyValueStore>, max_concurrent_jobs: usize) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            admission: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            store,
        }
    }

    /// Rehydrate persisted jobs at startup.
    ///
    /// Jobs that were pending or running when the process stopped are marked
    /// failed: transitions are one-way and the correlation key must free up
    /// for resubmission.
    pub async fn load_from_storage(&self) -> Result<usize, ScrapeError> {
        let keys = self.store.list_keys(Some(JOB_PREFIX)).await?;
        let mut loaded = 0usize;
        let mut interrupted = 0usize;

        for key in keys {
            let Some(doc) = self.store.get(&key).await? else {
                continue;
            };
            let mut job: Job = match serde_json::from_value(doc) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Skipping corrupt job record '{}': {}", key, e);
                    continue;
                }
            };

            if !job.status.is_terminal() {
                job.status = JobStatus::Failed;
                job.error = Some("interrupted by restart".into());
                job.completed_at = Some(Utc::now());
                interrupted += 1;
                self.persist(&job).await;
            }

            self.jobs.lock().await.insert(job.id.clone(), job);
            loaded += 1;
        }

        info!("Scheduler rehydrated: {} jobs loaded, {} marked interrupted", loaded, interrupted);
        Ok(loaded)
    }

    /// Create a pending job and schedule its execution.
    ///
    /// Returns the snapshot immediately; the ceiling only throttles
    /// execution, never creation.
    pub async fn submit<F, Fut>(&self, job_type: JobType, metadata: JobMetadata, work: F) -> Job
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<CampaignResult, ScrapeError>> + Send + 'static,
    {
        self.submit_boxed(job_type, metadata, Box::new(move |id| work(id).boxed()))
            .await
    }

    /// `submit` for pre-boxed work functions (batch and orchestrator paths).
    pub async fn submit_boxed(&self, job_type: JobType, metadata: JobMetadata, work: WorkFn) -> Job {
        let job = Job::new(job_type, metadata);
        let snapshot = job.clone();

        self.jobs.lock().await.insert(job.id.clone(), job.clone());
        self.persist(&job).await;
        debug!("Created job {} ({})", job.id, job.correlation_key());

        let jobs = Arc::clone(&self.jobs);
        let admission = Arc::clone(&self.admission);
        let store = Arc::clone(&self.store);
        let job_id = job.id.clone();

        tokio::spawn(async move {
            let Ok(_permit) = admission.acquire().await else {
                // Semaphore closed: process is shutting down.
                return;
            };

            // Cancelled while waiting for admission?
            {
                let mut guard = jobs.lock().await;
                let Some(job) = guard.get_mut(&job_id) else {
                    return;
                };
                if job.status != JobStatus::Pending {
                    debug!("Job {} no longer pending at admission, skipping", job_id);
                    return;
                }
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                Self::persist_with(&store, job).await;
            }

            let outcome = std::panic::AssertUnwindSafe(work(job_id.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(ScrapeError::Infrastructure("work function panicked".into()))
                });

            let mut guard = jobs.lock().await;
            let Some(job) = guard.get_mut(&job_id) else {
                return;
            };
            // Advisory cancellation may have already made this terminal;
            // transitions are one-way, so drop the late settlement.
            if job.status != JobStatus::Running {
                debug!("Discarding settlement for non-running job {}", job_id);
                return;
            }
            job.completed_at = Some(Utc::now());
            match outcome {
                Ok(result) => {
                    job.status = JobStatus::Completed;
                    job.result = Some(result);
                    job.error = None;
                    info!("Job {} completed", job_id);
                }
                Err(e) => {
                    job.status = JobStatus::Failed;
                    job.error = Some(e.to_string());
                    warn!("Job {} failed: {}", job_id, e);
                }
            }
            Self::persist_with(&store, job).await;
        });

        snapshot
    }

    /// Submit many jobs as one logical batch, preserving order.
    pub async fn create_batch(&self, configs: Vec<JobConfig>) -> Vec<Job> {
        let mut jobs = Vec::with_capacity(configs.len());
        for config in configs {
            jobs.push(
                self.submit_boxed(config.job_type, config.metadata, config.work)
                    .await,
            );
        }
        jobs
    }

    /// Find an existing non-failed job for the correlation key.
    ///
    /// Returns the newest match, or `None` when there is none (or all prior
    /// jobs for the key failed, permitting a retry).
    pub async fn find_by_correlation(
        &self,
        campaign_id: &str,
        category: Option<&str>,
        subcategory: Option<&str>,
    ) -> Option<Job> {
        let key = format!(
            "{}|{}|{}",
            campaign_id,
            category.unwrap_or(""),
            subcategory.unwrap_or("")
        );
        let guard = self.jobs.lock().await;
        guard
            .values()
            .filter(|j| j.correlation_key() == key && j.status != JobStatus::Failed)
            .max_by_key(|j| j.created_at)
            .cloned()
    }

    pub async fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    /// Every job for a campaign: parents and all descendants.
    pub async fn find_all_by_campaign(&self, campaign_id: &str) -> Vec<Job> {
        let guard = self.jobs.lock().await;
        let mut jobs: Vec<Job> = guard
            .values()
            .filter(|j| j.metadata.campaign_id == campaign_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub async fn list_by_status(&self, status: Option<JobStatus>) -> Vec<Job> {
        let guard = self.jobs.lock().await;
        let mut jobs: Vec<Job> = guard
            .values()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Merge fields into a job's metadata.
    ///
    /// Shares the store lock with status transitions, so a patch can never
    /// race a settlement into a lost update.
    pub async fn update_metadata(&self, job_id: &str, patch: MetadataPatch) -> bool {
        let mut guard = self.jobs.lock().await;
        let Some(job) = guard.get_mut(job_id) else {
            return false;
        };
        if let Some(parent) = patch.parent_job_id {
            job.metadata.parent_job_id = Some(parent);
        }
        if let Some(children) = patch.child_job_ids {
            job.metadata.child_job_ids = Some(children);
        }
        Self::persist_with(&self.store, job).await;
        true
    }

    /// Attach a progress hint to a running job.
    pub async fn set_progress(&self, job_id: &str, progress: JobProgress) {
        let mut guard = self.jobs.lock().await;
        if let Some(job) = guard.get_mut(job_id) {
            job.progress = Some(progress);
        }
    }

    /// Cancel a job.
    ///
    /// A pending job will never run. Cancelling a running job is advisory:
    /// the record goes failed immediately, but in-flight automation keeps
    /// running and its settlement is discarded by the transition guard.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let mut guard = self.jobs.lock().await;
        let Some(job) = guard.get_mut(job_id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }
        let was_running = job.status == JobStatus::Running;
        job.status = JobStatus::Failed;
        job.error = Some("cancelled".into());
        job.completed_at = Some(Utc::now());
        Self::persist_with(&self.store, job).await;
        if was_running {
            warn!("Cancelled running job {} (automation may continue in flight)", job_id);
        } else {
            info!("Cancelled pending job {}", job_id);
        }
        true
    }

    /// Drop terminal jobs older than the given age, in memory and storage.
    pub async fn purge_completed_older_than(&self, minutes: i64) -> usize {
        let cutoff = Utc::now() - Duration::minutes(minutes);
        let purged: Vec<String> = {
            let mut guard = self.jobs.lock().await;
            let ids: Vec<String> = guard
                .values()
                .filter(|j| {
                    j.status.is_terminal() && j.completed_at.is_some_and(|t| t < cutoff)
                })
                .map(|j| j.id.clone())
                .collect();
            for id in &ids {
                guard.remove(id);
            }
            ids
        };
        for id in &purged {
            if let Err(e) = self.store.delete(&format!("{JOB_PREFIX}{id}")).await {
                warn!("Failed to delete purged job record {}: {}", id, e);
            }
        }
        if !purged.is_empty() {
            info!("Purged {} terminal jobs older than {}m", purged.len(), minutes);
        }
        purged.len()
    }

    pub async fn stats(&self) -> SchedulerStats {
        let guard = self.jobs.lock().await;
        let mut stats = SchedulerStats::default();
        for job in guard.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
            stats.total += 1;
        }
        stats
    }

    async fn persist(&self, job: &Job) {
        Self::persist_with(&self.store, job).await;
    }

    /// Persistence is durable but non-blocking for correctness: a store
    /// failure is logged and the in-memory record stays authoritative.
    async fn persist_with(store: &Arc<dyn KeyValueStore>, job: &Job) {
        let key = format!("{JOB_PREFIX}{}", job.id);
        match serde_json::to_value(job) {
            Ok(doc) => {
                if let Err(e) = store.save(&key, &doc).await {
                    error!("Failed to persist job {}: {}", job.id, e);
                }
            }
            Err(e) => error!("Failed to serialize job {}: {}", job.id, e),
        }
    }
}
