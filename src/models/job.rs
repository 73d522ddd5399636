//! Job records for scheduled scraping work.
//!
//! The scheduler is the only writer; everyone else reads snapshots.
//! Transitions are one-way: pending -> running -> completed | failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CampaignResult;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Completed or failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// A single (campaign, category, subcategory) scrape.
    Scrape,
    /// A fan-out parent whose work is the aggregation wait-loop.
    Orchestrator,
}

/// Free-form progress hint attached while a job runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub items: usize,
    pub message: String,
}

/// Domain correlation fields carried by every job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetadata {
    pub campaign_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub max_load_more_clicks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_job_ids: Option<Vec<String>>,
}

impl JobMetadata {
    /// The dedup key: same tuple means "this is the same request".
    pub fn correlation_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.campaign_id,
            self.category.as_deref().unwrap_or(""),
            self.subcategory.as_deref().unwrap_or("")
        )
    }
}

/// One unit of scheduled work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CampaignResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: JobMetadata,
}

impl Job {
    /// Create a fresh pending job with a pre-assigned id.
    ///
    /// The id exists before the work function runs so a work function can
    /// wait on its own record.
    pub fn new(job_type: JobType, metadata: JobMetadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_type,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: None,
            result: None,
            error: None,
            metadata,
        }
    }

    pub fn correlation_key(&self) -> String {
        self.metadata.correlation_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for s in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(JobStatus::from_str("nope"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn correlation_key_distinguishes_subcategory() {
        let a = JobMetadata {
            campaign_id: "summer24".into(),
            category: Some("grocery".into()),
            ..Default::default()
        };
        let b = JobMetadata {
            campaign_id: "summer24".into(),
            category: Some("grocery".into()),
            subcategory: Some("dairy".into()),
            ..Default::default()
        };
        assert_ne!(a.correlation_key(), b.correlation_key());
    }

    #[test]
    fn new_job_is_pending_with_id() {
        let job = Job::new(JobType::Scrape, JobMetadata::default());
        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.id.is_empty());
        assert!(job.started_at.is_none());
        assert!(job.result.is_none());
    }
}
