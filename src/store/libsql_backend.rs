//! libSQL backend: async `JobStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::jobs::model::{JobStatus, WorkflowJob};
use crate::pipeline::types::WorkflowResult;
use crate::store::migrations;
use crate::store::traits::JobStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Current status of a job, or `NotFound`.
    async fn current_status(&self, id: Uuid) -> Result<JobStatus, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT status FROM workflow_jobs WHERE job_id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("current_status: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let status: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("current_status row parse: {e}")))?;
                status.parse().map_err(DatabaseError::Serialization)
            }
            Ok(None) => Err(not_found(id)),
            Err(e) => Err(DatabaseError::Query(format!("current_status: {e}"))),
        }
    }

    /// Look up the current status and refuse the move if the state machine forbids it.
    async fn guard_transition(
        &self,
        id: Uuid,
        target: JobStatus,
    ) -> Result<JobStatus, DatabaseError> {
        let current = self.current_status(id).await?;
        if !current.can_transition_to(target) {
            return Err(invalid_transition(id, current, target));
        }
        Ok(current)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Fixed-width RFC 3339, so text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn not_found(id: Uuid) -> DatabaseError {
    DatabaseError::NotFound {
        entity: "workflow_job".into(),
        id: id.to_string(),
    }
}

fn invalid_transition(id: Uuid, current: JobStatus, target: JobStatus) -> DatabaseError {
    DatabaseError::Constraint(format!(
        "job {id}: cannot transition from {current} to {target}"
    ))
}

/// Map a libsql Row to a WorkflowJob.
///
/// Column order matches JOB_COLUMNS:
/// 0:job_id, 1:status, 2:params, 3:result, 4:error, 5:created_at, 6:started_at, 7:completed_at
fn row_to_job(row: &libsql::Row) -> Result<WorkflowJob, DatabaseError> {
    let parse_err = |e: libsql::Error| DatabaseError::Query(format!("job row parse: {e}"));

    let id_str: String = row.get(0).map_err(parse_err)?;
    let status_str: String = row.get(1).map_err(parse_err)?;
    let params_str: String = row.get(2).map_err(parse_err)?;
    let result_str: Option<String> = row.get(3).ok();
    let error: Option<String> = row.get(4).ok();
    let created_str: String = row.get(5).map_err(parse_err)?;
    let started_str: Option<String> = row.get(6).ok();
    let completed_str: Option<String> = row.get(7).ok();

    let result: Option<WorkflowResult> = result_str
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DatabaseError::Serialization(format!("job result: {e}")))?;

    Ok(WorkflowJob {
        job_id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("job id '{id_str}': {e}")))?,
        status: status_str.parse().map_err(DatabaseError::Serialization)?,
        params: serde_json::from_str(&params_str)
            .map_err(|e| DatabaseError::Serialization(format!("job params: {e}")))?,
        created_at: parse_datetime(&created_str),
        started_at: parse_optional_datetime(&started_str),
        completed_at: parse_optional_datetime(&completed_str),
        result,
        error,
    })
}

/// Fail with `Constraint` when a compare-and-set update matched no row.
fn ensure_updated(
    changed: u64,
    id: Uuid,
    current: JobStatus,
    target: JobStatus,
) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(invalid_transition(id, current, target));
    }
    Ok(())
}

// ── Trait implementation ────────────────────────────────────────────

const JOB_COLUMNS: &str =
    "job_id, status, params, result, error, created_at, started_at, completed_at";

#[async_trait]
impl JobStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn insert_job(&self, job: &WorkflowJob) -> Result<(), DatabaseError> {
        let params_json = serde_json::to_string(&job.params)
            .map_err(|e| DatabaseError::Serialization(format!("job params: {e}")))?;
        let result_json = job
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DatabaseError::Serialization(format!("job result: {e}")))?;

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO workflow_jobs ({JOB_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    job.job_id.to_string(),
                    job.status.as_str(),
                    params_json,
                    opt_text_owned(result_json),
                    opt_text_owned(job.error.clone()),
                    format_datetime(&job.created_at),
                    opt_text_owned(job.started_at.as_ref().map(format_datetime)),
                    opt_text_owned(job.completed_at.as_ref().map(format_datetime)),
                ],
            )
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE") || msg.contains("PRIMARY KEY") {
                    DatabaseError::Constraint(format!("insert_job {}: {msg}", job.job_id))
                } else {
                    DatabaseError::Query(format!("insert_job: {msg}"))
                }
            })?;

        debug!(job_id = %job.job_id, status = %job.status, "Job inserted into DB");
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<WorkflowJob>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM workflow_jobs WHERE job_id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_job: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_job: {e}"))),
        }
    }

    async fn list_jobs(&self, limit: u32) -> Result<Vec<WorkflowJob>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM workflow_jobs ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ),
                params![i64::from(limit)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_jobs: {e}")))?;

        let mut jobs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_jobs: {e}")))?
        {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    async fn mark_started(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let target = JobStatus::Started;
        let current = self.guard_transition(id, target).await?;

        let changed = self
            .conn()
            .execute(
                "UPDATE workflow_jobs SET status = ?1, started_at = ?2 WHERE job_id = ?3 AND status = ?4",
                params![
                    target.as_str(),
                    format_datetime(&at),
                    id.to_string(),
                    current.as_str()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_started: {e}")))?;
        ensure_updated(changed, id, current, target)?;

        debug!(job_id = %id, "Job marked started");
        Ok(())
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        result: &WorkflowResult,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let target = JobStatus::Completed;
        let current = self.guard_transition(id, target).await?;
        let result_json = serde_json::to_string(result)
            .map_err(|e| DatabaseError::Serialization(format!("job result: {e}")))?;

        let changed = self
            .conn()
            .execute(
                "UPDATE workflow_jobs SET status = ?1, result = ?2, completed_at = ?3 WHERE job_id = ?4 AND status = ?5",
                params![
                    target.as_str(),
                    result_json,
                    format_datetime(&at),
                    id.to_string(),
                    current.as_str()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_completed: {e}")))?;
        ensure_updated(changed, id, current, target)?;

        debug!(job_id = %id, success = result.success, "Job marked completed");
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let target = JobStatus::Failed;
        let current = self.guard_transition(id, target).await?;

        let changed = self
            .conn()
            .execute(
                "UPDATE workflow_jobs SET status = ?1, error = ?2, completed_at = ?3 WHERE job_id = ?4 AND status = ?5",
                params![
                    target.as_str(),
                    error,
                    format_datetime(&at),
                    id.to_string(),
                    current.as_str()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_failed: {e}")))?;
        ensure_updated(changed, id, current, target)?;

        debug!(job_id = %id, "Job marked failed");
        Ok(())
    }
}
