use serde::{Deserialize, Serialize};
use std::fmt;

// Size of a single tracked file, as collected from disk or decoded from a
// previous run's artifact. Sequences are kept sorted by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub path: String,
    pub bytes: u64,
}

// Read-only snapshot of a pipeline as returned by the GitLab v4 API. Only the
// fields we consume are modeled; everything but the id may be absent.
#[derive(Debug, Clone, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub web_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Pending,
    Running,
    WaitingForResource,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    #[serde(other)]
    Other,
}

impl JobStatus {
    // The pending class: not yet terminal, must be re-polled.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            JobStatus::Created
                | JobStatus::Pending
                | JobStatus::Running
                | JobStatus::WaitingForResource
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::WaitingForResource => "waiting_for_resource",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Skipped => "skipped",
            JobStatus::Manual => "manual",
            JobStatus::Other => "other",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineJob {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub web_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequestNote {
    pub id: u64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub system: bool,
}
