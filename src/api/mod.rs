//! HTTP surface: workflow submission and job status.

pub mod error;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::{ApiState, api_routes};
