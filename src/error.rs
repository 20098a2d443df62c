//! Error types for the feedback triage service.

use uuid::Uuid;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Errors from the social feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Invalid time period '{0}'. Use formats like '1d', '30m', '1h'")]
    InvalidTimePeriod(String),

    #[error("Feed request failed: {0}")]
    Request(String),

    #[error("Feed API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode feed response: {0}")]
    Decode(String),
}

/// Errors from classifying a single item.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Malformed classifier output: {0}")]
    Malformed(String),

    #[error("Decision violates invariant: {0}")]
    InvalidDecision(String),
}

/// Errors from the task board client.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Either board_id or board_name must be provided")]
    MissingDestination,

    #[error("Board request failed: {0}")]
    Request(String),

    #[error("Board API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode board response: {0}")]
    Decode(String),
}

impl BoardError {
    /// Whether the pipeline may count this failure and move on to the next item.
    ///
    /// A missing destination is a caller defect, not a per-item problem,
    /// so it aborts the run.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MissingDestination)
    }
}

/// Request validation errors, raised before any external call.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid time period '{0}'. Use formats like '1d', '30m', '1h'")]
    InvalidTimePeriod(String),

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("max_items must be at least 1")]
    NonPositiveMaxItems,

    #[error("Either board_id or board_name must be provided")]
    MissingDestination,
}

/// Job-related errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} already exists")]
    AlreadyExists { id: Uuid },

    #[error("Invalid workflow request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Job store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Errors that abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FeedError),

    #[error("Card destination unusable: {0}")]
    Board(#[from] BoardError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_destination_is_not_recoverable() {
        assert!(!BoardError::MissingDestination.is_recoverable());
        assert!(BoardError::Request("timeout".into()).is_recoverable());
        assert!(
            BoardError::Api {
                status: 500,
                body: "oops".into()
            }
            .is_recoverable()
        );
    }

    #[test]
    fn validation_error_messages() {
        assert_eq!(
            ValidationError::EmptyField {
                field: "product_name"
            }
            .to_string(),
            "product_name must not be empty"
        );
        assert!(
            ValidationError::InvalidTimePeriod("2w".into())
                .to_string()
                .contains("'2w'")
        );
    }
}
