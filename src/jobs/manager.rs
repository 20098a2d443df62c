//! Job manager: runs workflow requests as tracked background jobs.
//!
//! `submit` validates, persists a PENDING record and returns at once. A
//! tokio task then drives the record through STARTED to COMPLETED, or to
//! FAILED if the store refuses to record progress.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{DatabaseError, JobError};
use crate::jobs::model::{JobTicket, WorkflowJob};
use crate::pipeline::orchestrator::WorkflowOrchestrator;
use crate::pipeline::types::WorkflowRequest;
use crate::store::JobStore;

/// Submits workflow runs and answers status queries.
#[derive(Clone)]
pub struct JobManager {
    store: Arc<dyn JobStore>,
    orchestrator: Arc<WorkflowOrchestrator>,
}

impl JobManager {
    pub fn new(store: Arc<dyn JobStore>, orchestrator: Arc<WorkflowOrchestrator>) -> Self {
        Self {
            store,
            orchestrator,
        }
    }

    /// Accept a request under a fresh job id.
    pub async fn submit(&self, request: WorkflowRequest) -> Result<JobTicket, JobError> {
        self.submit_with_id(Uuid::new_v4(), request).await
    }

    /// Accept a request under a caller-chosen job id.
    pub async fn submit_with_id(
        &self,
        job_id: Uuid,
        request: WorkflowRequest,
    ) -> Result<JobTicket, JobError> {
        request.validate()?;

        let job = WorkflowJob::new(job_id, request.snapshot());
        self.store.insert_job(&job).await.map_err(|e| match e {
            DatabaseError::Constraint(_) => JobError::AlreadyExists { id: job_id },
            other => JobError::Store(other),
        })?;

        info!(
            job_id = %job_id,
            product = %request.product_name,
            "Workflow job accepted"
        );

        let store = Arc::clone(&self.store);
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            run_job(store, orchestrator, job_id, request).await;
        });

        Ok(JobTicket {
            job_id,
            status: job.status,
        })
    }

    /// Current record for a job.
    pub async fn get_status(&self, job_id: Uuid) -> Result<WorkflowJob, JobError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or(JobError::NotFound { id: job_id })
    }

    /// Most recent jobs first.
    pub async fn list_jobs(&self, limit: u32) -> Result<Vec<WorkflowJob>, JobError> {
        Ok(self.store.list_jobs(limit).await?)
    }
}

/// Worker body for one job.
///
/// The orchestrator always hands back a result, so a job fails only when
/// its record cannot be moved forward.
async fn run_job(
    store: Arc<dyn JobStore>,
    orchestrator: Arc<WorkflowOrchestrator>,
    job_id: Uuid,
    request: WorkflowRequest,
) {
    if let Err(e) = store.mark_started(job_id, Utc::now()).await {
        error!(job_id = %job_id, error = %e, "Failed to mark job started");
        fail_job(store.as_ref(), job_id, &format!("could not start job: {e}")).await;
        return;
    }
    info!(job_id = %job_id, "Workflow job started");

    let result = orchestrator.run(&request).await;
    info!(
        job_id = %job_id,
        success = result.success,
        "Workflow job completed"
    );

    if let Err(e) = store.mark_completed(job_id, &result, Utc::now()).await {
        warn!(job_id = %job_id, error = %e, "Failed to record job result");
        fail_job(store.as_ref(), job_id, &format!("could not record result: {e}")).await;
    }
}

async fn fail_job(store: &dyn JobStore, job_id: Uuid, message: &str) {
    if let Err(e) = store.mark_failed(job_id, message, Utc::now()).await {
        error!(job_id = %job_id, error = %e, "Failed to record job failure");
    }
}
