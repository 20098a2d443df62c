//! X (Twitter) feed: v2 recent search.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::FeedError;
use crate::pipeline::types::{CandidateItem, FeedClient, TimePeriod};

pub const DEFAULT_BASE_URL: &str = "https://api.x.com";

/// Bounds the recent-search endpoint accepts for `max_results`.
const API_MIN_RESULTS: u32 = 10;
const API_MAX_RESULTS: u32 = 100;

const TWEET_FIELDS: &str = "public_metrics,created_at,lang,source";

pub const SOURCE_LABEL: &str = "x";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<Vec<Tweet>>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    #[serde(default)]
    public_metrics: PublicMetrics,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    lang: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PublicMetrics {
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    reply_count: u64,
}

impl From<Tweet> for CandidateItem {
    fn from(tweet: Tweet) -> Self {
        Self {
            id: tweet.id,
            text: tweet.text,
            likes: tweet.public_metrics.like_count,
            retweets: tweet.public_metrics.retweet_count,
            replies: tweet.public_metrics.reply_count,
            created_at: tweet.created_at,
            lang: tweet.lang,
            source: SOURCE_LABEL.to_string(),
        }
    }
}

/// Feed client for the X API, authenticated with an app bearer token.
pub struct XFeedClient {
    bearer_token: SecretString,
    base_url: String,
    client: Client,
}

impl XFeedClient {
    pub fn new(bearer_token: SecretString) -> Self {
        Self {
            bearer_token,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn search_url(&self) -> String {
        format!("{}/2/tweets/search/recent", self.base_url)
    }
}

/// Query parameters for one search.
fn search_params(
    query: &str,
    start_time: DateTime<Utc>,
    max_items: u32,
) -> Vec<(&'static str, String)> {
    vec![
        ("query", query.to_string()),
        (
            "start_time",
            start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        (
            "max_results",
            max_items.clamp(API_MIN_RESULTS, API_MAX_RESULTS).to_string(),
        ),
        ("sort_order", "relevancy".to_string()),
        ("tweet.fields", TWEET_FIELDS.to_string()),
    ]
}

/// Decode a search response body into at most `max_items` items.
fn parse_search(body: &str, max_items: u32) -> Result<Vec<CandidateItem>, FeedError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;
    Ok(response
        .data
        .unwrap_or_default()
        .into_iter()
        .take(max_items as usize)
        .map(CandidateItem::from)
        .collect())
}

#[async_trait]
impl FeedClient for XFeedClient {
    async fn fetch(
        &self,
        query: &str,
        time_period: &str,
        max_items: u32,
    ) -> Result<Vec<CandidateItem>, FeedError> {
        let period: TimePeriod = time_period
            .parse()
            .map_err(|_| FeedError::InvalidTimePeriod(time_period.to_string()))?;
        let start_time = period.start_from(Utc::now());

        let response = self
            .client
            .get(self.search_url())
            .bearer_auth(self.bearer_token.expose_secret())
            .query(&search_params(query, start_time, max_items))
            .send()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(FeedError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let items = parse_search(&body, max_items)?;
        debug!(query, count = items.len(), "Fetched posts from X");
        Ok(items)
    }
}
