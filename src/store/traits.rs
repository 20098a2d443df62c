//! `JobStore` trait: async interface for job persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::jobs::model::WorkflowJob;
use crate::pipeline::types::WorkflowResult;

/// Backend-agnostic storage for workflow jobs.
///
/// Status updates are compare-and-set: a write that would break
/// `JobStatus::can_transition_to` fails with `DatabaseError::Constraint`
/// and leaves the record untouched.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Insert a new job. A duplicate id is a `Constraint` error.
    async fn insert_job(&self, job: &WorkflowJob) -> Result<(), DatabaseError>;

    /// Get a job by ID.
    async fn get_job(&self, id: Uuid) -> Result<Option<WorkflowJob>, DatabaseError>;

    /// Most recently created jobs first, up to `limit`.
    async fn list_jobs(&self, limit: u32) -> Result<Vec<WorkflowJob>, DatabaseError>;

    /// PENDING → STARTED.
    async fn mark_started(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError>;

    /// STARTED → COMPLETED with the pipeline result.
    async fn mark_completed(
        &self,
        id: Uuid,
        result: &WorkflowResult,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// PENDING/STARTED → FAILED with an error message.
    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
}
