//! Shared types for the workflow pipeline.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{BoardError, ClassifyError, FeedError, ValidationError};
use crate::pipeline::rules::PrioritizationRule;

pub const DEFAULT_TIME_PERIOD: &str = "1d";
pub const DEFAULT_MAX_ITEMS: u32 = 5;
pub const DEFAULT_BOARD_NAME: &str = "Product Development";
pub const DEFAULT_LIST_NAME: &str = "Social Media";

static TIME_PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([dhm])$").expect("time period regex is valid"));

// ── Time period ─────────────────────────────────────────────────────

/// Unit of a lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
}

/// A lookback window such as `1d`, `2h` or `30m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePeriod {
    pub value: u32,
    pub unit: TimeUnit,
}

impl TimePeriod {
    /// Length of the window.
    pub fn to_duration(self) -> chrono::Duration {
        let value = i64::from(self.value);
        match self.unit {
            TimeUnit::Days => chrono::Duration::days(value),
            TimeUnit::Hours => chrono::Duration::hours(value),
            TimeUnit::Minutes => chrono::Duration::minutes(value),
        }
    }

    /// Start of the window, counted back from `now`.
    pub fn start_from(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.to_duration())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl FromStr for TimePeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTimePeriod(s.to_string());
        let caps = TIME_PERIOD_RE.captures(s.trim()).ok_or_else(invalid)?;
        let value: u32 = caps[1].parse().map_err(|_| invalid())?;
        if value == 0 {
            return Err(invalid());
        }
        let unit = match &caps[2] {
            "d" => TimeUnit::Days,
            "h" => TimeUnit::Hours,
            _ => TimeUnit::Minutes,
        };
        Ok(Self { value, unit })
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            TimeUnit::Days => 'd',
            TimeUnit::Hours => 'h',
            TimeUnit::Minutes => 'm',
        };
        write!(f, "{}{}", self.value, unit)
    }
}

// ── Candidate item ──────────────────────────────────────────────────

/// One fetched social post with its engagement counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Post ID on the source platform.
    pub id: String,
    /// Post body.
    pub text: String,
    pub likes: u64,
    pub retweets: u64,
    pub replies: u64,
    /// When the post was created (if the source reported it).
    pub created_at: Option<DateTime<Utc>>,
    /// BCP-47 language tag reported by the source.
    pub lang: Option<String>,
    /// Source label, e.g. "x".
    pub source: String,
}

impl CandidateItem {
    /// Public URL of the post, when the source is known.
    pub fn url(&self) -> Option<String> {
        if self.source == "x" && !self.id.is_empty() {
            Some(format!("https://x.com/i/web/status/{}", self.id))
        } else {
            None
        }
    }
}

// ── Decision ────────────────────────────────────────────────────────

/// Card priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "High"),
            Self::Medium => write!(f, "Medium"),
            Self::Low => write!(f, "Low"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown priority: '{other}'")),
        }
    }
}

/// Actionable category, carried as a prefix tag on the card title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    BugReport,
    FeatureRequest,
    ImprovementSuggestion,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::BugReport,
        Category::FeatureRequest,
        Category::ImprovementSuggestion,
    ];

    /// The bracketed tag that prefixes card titles.
    pub fn tag(self) -> &'static str {
        match self {
            Self::BugReport => "[Bug Report]",
            Self::FeatureRequest => "[Feature Request]",
            Self::ImprovementSuggestion => "[Improvement Suggestion]",
        }
    }

    /// Detect the category from a title's prefix tag.
    pub fn from_title(title: &str) -> Option<Self> {
        let title = title.trim_start();
        Self::ALL.into_iter().find(|c| title.starts_with(c.tag()))
    }
}

/// Classifier verdict on one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ClassificationDecision {
    /// File a card for this item.
    Add {
        title: String,
        category: Category,
        priority: Priority,
        description: String,
    },
    /// Not actionable.
    Skip { reason: Option<String> },
}

impl ClassificationDecision {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Skip { .. } => "skip",
        }
    }
}

// ── Request ─────────────────────────────────────────────────────────

/// Credentials for the task board, supplied per request.
#[derive(Debug, Deserialize)]
pub struct BoardCredentials {
    #[serde(alias = "trello_api_key", deserialize_with = "deserialize_secret")]
    pub board_api_key: SecretString,
    #[serde(alias = "trello_token", deserialize_with = "deserialize_secret")]
    pub board_token: SecretString,
}

impl BoardCredentials {
    pub fn new(api_key: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            board_api_key: SecretString::from(api_key.into()),
            board_token: SecretString::from(token.into()),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(SecretString::from(raw))
}

fn default_time_period() -> String {
    DEFAULT_TIME_PERIOD.to_string()
}

fn default_max_items() -> u32 {
    DEFAULT_MAX_ITEMS
}

fn default_board_name() -> String {
    DEFAULT_BOARD_NAME.to_string()
}

fn default_list_name() -> String {
    DEFAULT_LIST_NAME.to_string()
}

/// Input to one pipeline run.
#[derive(Debug, Deserialize)]
pub struct WorkflowRequest {
    pub product_name: String,
    pub product_description: String,
    #[serde(flatten)]
    pub credentials: BoardCredentials,
    #[serde(default)]
    pub prioritization_rule: PrioritizationRule,
    #[serde(default = "default_time_period")]
    pub time_period: String,
    #[serde(default = "default_max_items", alias = "max_tweets")]
    pub max_items: u32,
    #[serde(default)]
    pub board_id: Option<String>,
    #[serde(default = "default_board_name")]
    pub board_name: String,
    #[serde(default = "default_list_name")]
    pub list_name: String,
}

impl WorkflowRequest {
    /// Create a request with default window, limits and destination.
    pub fn new(
        product_name: impl Into<String>,
        product_description: impl Into<String>,
        credentials: BoardCredentials,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            product_description: product_description.into(),
            credentials,
            prioritization_rule: PrioritizationRule::default(),
            time_period: default_time_period(),
            max_items: DEFAULT_MAX_ITEMS,
            board_id: None,
            board_name: default_board_name(),
            list_name: default_list_name(),
        }
    }

    pub fn with_time_period(mut self, period: impl Into<String>) -> Self {
        self.time_period = period.into();
        self
    }

    pub fn with_max_items(mut self, max_items: u32) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_board_id(mut self, board_id: impl Into<String>) -> Self {
        self.board_id = Some(board_id.into());
        self
    }

    pub fn with_board_name(mut self, board_name: impl Into<String>) -> Self {
        self.board_name = board_name.into();
        self
    }

    pub fn with_list_name(mut self, list_name: impl Into<String>) -> Self {
        self.list_name = list_name.into();
        self
    }

    /// Board id, if one was given and is non-blank.
    pub fn board_id(&self) -> Option<&str> {
        self.board_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Board name, if non-blank.
    pub fn board_name(&self) -> Option<&str> {
        Some(self.board_name.as_str()).filter(|name| !name.trim().is_empty())
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<TimePeriod, ValidationError> {
        if self.product_name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "product_name",
            });
        }
        if self.list_name.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "list_name" });
        }
        if self.max_items == 0 {
            return Err(ValidationError::NonPositiveMaxItems);
        }
        if self.board_id().is_none() && self.board_name().is_none() {
            return Err(ValidationError::MissingDestination);
        }
        self.time_period.parse()
    }

    /// The persisted copy of this request. Credentials are left out.
    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            product_name: self.product_name.clone(),
            product_description: self.product_description.clone(),
            prioritization_rule: self.prioritization_rule.clone(),
            time_period: self.time_period.clone(),
            max_items: self.max_items,
            board_id: self.board_id.clone(),
            board_name: self.board_name.clone(),
            list_name: self.list_name.clone(),
        }
    }
}

/// Request parameters as stored on a job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub product_name: String,
    pub product_description: String,
    pub prioritization_rule: PrioritizationRule,
    pub time_period: String,
    pub max_items: u32,
    pub board_id: Option<String>,
    pub board_name: String,
    pub list_name: String,
}

// ── Metrics & result ────────────────────────────────────────────────

/// Pipeline phase at which a run-aborting failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Fetch,
    Classify,
    Act,
    Unknown,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Classify => "classify",
            Self::Act => "act",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// What happened to a single item.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    /// Classifier said the post is not actionable.
    Skipped,
    /// A card was filed.
    CardCreated(CardRef),
    /// Classifier call or its output failed.
    ClassificationFailed,
    /// Card creation failed for a recoverable reason.
    CardFailed,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    /// Wall-clock seconds for the whole run.
    pub time_taken: f64,
    pub processed: u64,
    pub cards_added: u64,
    pub classification_errors: u64,
    #[serde(alias = "trello_errors")]
    pub card_errors: u64,
}

impl WorkflowMetrics {
    /// Fold one item outcome into the counters.
    pub fn record(&mut self, outcome: &ItemOutcome) {
        self.processed += 1;
        match outcome {
            ItemOutcome::Skipped => {}
            ItemOutcome::CardCreated(_) => self.cards_added += 1,
            ItemOutcome::ClassificationFailed => self.classification_errors += 1,
            ItemOutcome::CardFailed => self.card_errors += 1,
        }
    }

    /// Stamp the elapsed time. Consumes the accumulator so it happens once.
    pub fn finalize(mut self, elapsed: Duration) -> Self {
        self.time_taken = elapsed.as_secs_f64();
        self
    }
}

/// Terminal output of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub stage: Option<Stage>,
    pub metrics: WorkflowMetrics,
    #[serde(default)]
    pub message: Option<String>,
}

impl WorkflowResult {
    pub fn succeeded(metrics: WorkflowMetrics, message: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            stage: None,
            metrics,
            message: Some(message.into()),
        }
    }

    pub fn failed(stage: Stage, error: impl Into<String>, metrics: WorkflowMetrics) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            stage: Some(stage),
            metrics,
            message: None,
        }
    }
}

// ── Collaborator traits ─────────────────────────────────────────────

/// Source of candidate posts.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch up to `max_items` posts matching `query` within `time_period`.
    ///
    /// An empty vector means nothing matched; it is not an error.
    async fn fetch(
        &self,
        query: &str,
        time_period: &str,
        max_items: u32,
    ) -> Result<Vec<CandidateItem>, FeedError>;
}

/// Decides whether and how to act on one post.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        item: &CandidateItem,
        rule: &PrioritizationRule,
        product_description: &str,
    ) -> Result<ClassificationDecision, ClassifyError>;
}

/// Reference to a created card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Task board operations, bound to one set of credentials.
#[async_trait]
pub trait BoardClient: Send + Sync {
    /// Resolve the destination board. An explicit id always wins.
    async fn ensure_destination(
        &self,
        board_id: Option<&str>,
        board_name: Option<&str>,
    ) -> Result<String, BoardError>;

    /// Find the named list on the board, creating it if absent.
    async fn ensure_list(&self, board_id: &str, list_name: &str) -> Result<String, BoardError>;

    /// File a card on the list.
    async fn create_card(
        &self,
        list_id: &str,
        title: &str,
        priority: Priority,
        description: &str,
    ) -> Result<CardRef, BoardError>;
}

/// Builds board clients from per-request credentials.
pub trait BoardConnector: Send + Sync {
    fn connect(&self, credentials: &BoardCredentials) -> Arc<dyn BoardClient>;
}
