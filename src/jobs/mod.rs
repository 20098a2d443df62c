//! Background job tracking for workflow runs.
//!
//! - `model`: job status machine (PENDING → STARTED → COMPLETED/FAILED) and record
//! - `manager`: submit, spawn, and query

pub mod manager;
pub mod model;

pub use manager::JobManager;
pub use model::{JobStatus, JobTicket, WorkflowJob};
