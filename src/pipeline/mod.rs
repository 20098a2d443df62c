//! Feedback triage pipeline.
//!
//! Every run flows through:
//! 1. `FeedClient::fetch()`: recent posts about the product
//! 2. `Classifier::classify()`: one LLM verdict per post
//! 3. `BoardClient::create_card()`: a card for each actionable post
//!
//! `WorkflowOrchestrator` sequences the three and keeps the metrics.

pub mod classifier;
pub mod orchestrator;
pub mod rules;
pub mod types;

pub use classifier::LlmClassifier;
pub use orchestrator::WorkflowOrchestrator;
pub use rules::PrioritizationRule;
pub use types::*;
