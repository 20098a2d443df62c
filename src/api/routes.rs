//! REST endpoints for submitting and tracking workflow jobs.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use crate::jobs::{JobManager, JobTicket, WorkflowJob};
use crate::pipeline::types::WorkflowRequest;

const DEFAULT_LIST_LIMIT: u32 = 20;
const MAX_LIST_LIMIT: u32 = 100;

/// Shared state for workflow routes.
#[derive(Clone)]
pub struct ApiState {
    pub jobs: JobManager,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<u32>,
}

/// POST /api/v1/workflows
///
/// Validates the request and queues it. Returns the job id at once.
async fn submit_workflow(
    State(state): State<ApiState>,
    Json(request): Json<WorkflowRequest>,
) -> ApiResult<Json<JobTicket>> {
    let ticket = state.jobs.submit(request).await?;
    Ok(Json(ticket))
}

/// GET /api/v1/workflows/{job_id}
async fn get_workflow(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<WorkflowJob>> {
    let id = Uuid::parse_str(&job_id)
        .map_err(|_| ApiError::NotFound(format!("Job {job_id} not found")))?;
    let job = state.jobs.get_status(id).await?;
    Ok(Json(job))
}

/// GET /api/v1/workflows?limit=N
async fn list_workflows(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let jobs = state.jobs.list_jobs(limit).await?;
    Ok(Json(serde_json::json!({ "jobs": jobs })))
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the REST routes with permissive CORS.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/workflows",
            get(list_workflows).post(submit_workflow),
        )
        .route("/api/v1/workflows/{job_id}", get(get_workflow))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
