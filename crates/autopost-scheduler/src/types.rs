use autopost_core::{Platform, PostPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its scheduled_at time.
    Pending,
    /// Claimed by a poll cycle; the publish call is in flight.
    Publishing,
    /// Delivered; `post_id` holds the platform's id. Terminal.
    Published,
    /// Attempt ceiling reached; `last_error` holds the detail. Terminal.
    Failed,
    /// Cancelled by the operator while still pending. Terminal.
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Published | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Publishing => "publishing",
            JobStatus::Published => "published",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "publishing" => Ok(JobStatus::Publishing),
            "published" => Ok(JobStatus::Published),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A persisted scheduled-post record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// UUID v4 string. Primary key, immutable.
    pub id: String,
    /// Target platform, denormalized from the payload for filtering.
    pub platform: Platform,
    /// Publish instructions forwarded to the publisher on firing.
    pub payload: PostPayload,
    /// When the job should fire (UTC). Pushed forward on retry.
    pub scheduled_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Publish attempts so far; incremented when a cycle claims the job.
    pub attempt_count: u32,
    /// Platform post id, set on success.
    pub post_id: Option<String>,
    /// Detail of the most recent failed attempt.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional filters for queue listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub platform: Option<Platform>,
}

impl JobFilter {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            platform: None,
        }
    }
}

/// Per-status queue counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub publishing: u64,
    pub published: u64,
    pub failed: u64,
    pub cancelled: u64,
}
