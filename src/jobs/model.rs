//! Job state machine and the persisted job record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::types::{RequestSnapshot, WorkflowResult};

/// Status of a workflow job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Accepted, worker not yet running.
    Pending,
    /// Worker picked the job up.
    Started,
    /// The pipeline returned a result (which may itself report failure).
    Completed,
    /// The worker crashed before producing a result.
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Started,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Check if this status allows moving to `target`.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Pending, Started) | (Pending, Failed) | (Started, Completed) | (Started, Failed)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown job status: '{s}'"))
    }
}

/// One tracked pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowJob {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// Request parameters, credentials removed.
    pub params: RequestSnapshot,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Pipeline output; set when COMPLETED.
    pub result: Option<WorkflowResult>,
    /// Crash message; set when FAILED.
    pub error: Option<String>,
}

impl WorkflowJob {
    /// A freshly accepted job.
    pub fn new(job_id: Uuid, params: RequestSnapshot) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            params,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}

/// Returned to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub job_id: Uuid,
    pub status: JobStatus,
}
