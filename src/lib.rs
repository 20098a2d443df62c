//! Feedback Triage: turns social posts about a product into task board cards.

pub mod api;
pub mod board;
pub mod config;
pub mod error;
pub mod feed;
pub mod jobs;
pub mod llm;
pub mod pipeline;
pub mod store;
