//! Prioritization rules supplied with a workflow request.
//!
//! A rule is either free-form guidance for the classifier, a set of
//! per-priority engagement thresholds, or an arbitrary JSON rule set.
//! Thresholds are evaluated locally and handed to the classifier as an
//! engagement hint; the classifier still makes the final call.

use serde::{Deserialize, Serialize};

use crate::pipeline::types::{CandidateItem, Priority};

/// Minimum engagement a post needs to reach a priority level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngagementThreshold {
    #[serde(default)]
    pub min_likes: u64,
    #[serde(default)]
    pub min_retweets: u64,
    #[serde(default)]
    pub min_replies: u64,
}

impl EngagementThreshold {
    pub fn is_met_by(&self, item: &CandidateItem) -> bool {
        item.likes >= self.min_likes
            && item.retweets >= self.min_retweets
            && item.replies >= self.min_replies
    }
}

/// Engagement thresholds keyed by priority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriorityThresholds {
    #[serde(
        rename = "High",
        alias = "high",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub high: Option<EngagementThreshold>,
    #[serde(
        rename = "Medium",
        alias = "medium",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub medium: Option<EngagementThreshold>,
    #[serde(
        rename = "Low",
        alias = "low",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub low: Option<EngagementThreshold>,
}

impl PriorityThresholds {
    /// Highest priority whose threshold the item meets.
    pub fn evaluate(&self, item: &CandidateItem) -> Option<Priority> {
        [
            (Priority::High, self.high),
            (Priority::Medium, self.medium),
            (Priority::Low, self.low),
        ]
        .into_iter()
        .find_map(|(priority, threshold)| {
            threshold
                .filter(|t| t.is_met_by(item))
                .map(|_| priority)
        })
    }
}

/// How the caller wants cards prioritized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrioritizationRule {
    /// Free-form guidance, passed to the classifier verbatim.
    Text(String),
    /// Structured engagement thresholds.
    Thresholds(PriorityThresholds),
    /// Any other JSON rule set, passed to the classifier verbatim.
    Custom(serde_json::Value),
}

impl Default for PrioritizationRule {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl PrioritizationRule {
    /// True when the caller gave no guidance at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Thresholds(t) => t.high.is_none() && t.medium.is_none() && t.low.is_none(),
            Self::Custom(value) => value.is_null(),
        }
    }

    /// Priority suggested by engagement thresholds, if the rule has any.
    pub fn suggest(&self, item: &CandidateItem) -> Option<Priority> {
        match self {
            Self::Thresholds(thresholds) => thresholds.evaluate(item),
            _ => None,
        }
    }

    /// Render the rule for inclusion in a classifier prompt.
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "(none set, use your own judgement)".to_string();
        }
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Thresholds(t) => serde_json::to_string_pretty(t).unwrap_or_default(),
            Self::Custom(value) => serde_json::to_string_pretty(value).unwrap_or_default(),
        }
    }
}
