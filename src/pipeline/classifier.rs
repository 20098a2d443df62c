//! LLM-backed classifier: decides whether a post becomes a card.
//!
//! Flow:
//! 1. Build a prompt from the post, the prioritization rule and the
//!    product description
//! 2. One LLM completion
//! 3. Extract and validate a structured JSON decision
//!
//! Output that cannot be turned into a valid decision is an error, never a
//! silent skip.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ClassifyError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::rules::PrioritizationRule;
use crate::pipeline::types::{
    CandidateItem, Category, ClassificationDecision, Classifier, Priority,
};

/// Max tokens for the classification call.
const CLASSIFY_MAX_TOKENS: u32 = 1024;

/// Temperature for classification (deterministic-ish).
const CLASSIFY_TEMPERATURE: f32 = 0.1;

const CLASSIFY_TOP_P: f32 = 0.95;

/// Post text beyond this many characters is dropped from the prompt.
const MAX_POST_CHARS: usize = 2000;

/// Classifier that asks an LLM for a structured decision.
pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        item: &CandidateItem,
        rule: &PrioritizationRule,
        product_description: &str,
    ) -> Result<ClassificationDecision, ClassifyError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt()),
            ChatMessage::user(build_user_prompt(item, rule, product_description)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_top_p(CLASSIFY_TOP_P)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;

        let decision = parse_decision(&response.content).inspect_err(|e| {
            warn!(
                item_id = %item.id,
                raw_response = %response.content,
                error = %e,
                "Failed to parse classifier response"
            );
        })?;

        debug!(
            item_id = %item.id,
            model = self.llm.model_name(),
            decision = decision.label(),
            "Item classified"
        );
        Ok(decision)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_system_prompt() -> String {
    "You decide whether a social media post should become a card on a product \
     development task board.\n\n\
     A post is actionable only if it is relevant to the product AND is one of:\n\
     - a bug or problem report\n\
     - a feature request\n\
     - a suggestion to improve the product\n\
     Anything else (praise, news, jokes, unrelated chatter) is not actionable.\n\n\
     Respond with ONLY a JSON object, no code fences.\n\n\
     When not actionable:\n\
     {\"add\": false, \"reason\": \"...\"}\n\n\
     When actionable:\n\
     {\"add\": true, \"card_name\": \"...\", \"priority\": \"High|Medium|Low\", \"card_description\": \"...\"}\n\n\
     Rules:\n\
     - card_name must start with exactly one of \"[Bug Report]\", \"[Feature Request]\", \
     \"[Improvement Suggestion]\" followed by a concise title\n\
     - priority comes from the engagement metrics and the prioritization rule; \
     if no rule is set, use your own judgement\n\
     - card_description says clearly what the team should do, and ends with the \
     source URL when one is given\n\n\
     Example:\n\
     {\"add\": true, \"card_name\": \"[Bug Report] App crashes on startup\", \"priority\": \"High\", \
     \"card_description\": \"The app crashes immediately on startup. Investigate and fix. Source: https://x.com/i/web/status/12345\"}"
        .to_string()
}

fn build_user_prompt(
    item: &CandidateItem,
    rule: &PrioritizationRule,
    product_description: &str,
) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(&format!("Product description: {}\n", product_description.trim()));
    prompt.push_str(&format!("Prioritization rule:\n{}\n", rule.describe()));
    if let Some(hint) = rule.suggest(item) {
        prompt.push_str(&format!("Engagement thresholds suggest priority: {hint}\n"));
    }

    prompt.push_str("\nPost:\n");
    prompt.push_str(&format!(
        "- likes: {}\n- retweets: {}\n- replies: {}\n",
        item.likes, item.retweets, item.replies
    ));
    if let Some(ref lang) = item.lang {
        prompt.push_str(&format!("- language: {lang}\n"));
    }
    if let Some(url) = item.url() {
        prompt.push_str(&format!("- source: {url}\n"));
    }

    let text: String = item.text.chars().take(MAX_POST_CHARS).collect();
    prompt.push_str(&format!("- text: {text}"));

    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// Raw classifier output.
#[derive(Debug, Deserialize)]
struct DecisionResponse {
    add: bool,
    #[serde(default, alias = "title")]
    card_name: String,
    #[serde(default)]
    priority: String,
    #[serde(default, alias = "description")]
    card_description: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Parse and validate the classifier output.
fn parse_decision(raw: &str) -> Result<ClassificationDecision, ClassifyError> {
    let json_str = extract_json_object(raw);
    let response: DecisionResponse = serde_json::from_str(&json_str)
        .map_err(|e| ClassifyError::Malformed(format!("JSON parse error: {e}")))?;

    if !response.add {
        return Ok(ClassificationDecision::Skip {
            reason: response.reason.filter(|r| !r.trim().is_empty()),
        });
    }

    let title = response.card_name.trim().to_string();
    let description = response.card_description.trim().to_string();

    if title.is_empty() {
        return Err(ClassifyError::InvalidDecision("card_name is empty".into()));
    }
    if description.is_empty() {
        return Err(ClassifyError::InvalidDecision(
            "card_description is empty".into(),
        ));
    }
    let category = Category::from_title(&title).ok_or_else(|| {
        ClassifyError::InvalidDecision(format!("card_name lacks a category tag: '{title}'"))
    })?;
    let priority: Priority = response
        .priority
        .parse()
        .map_err(ClassifyError::InvalidDecision)?;

    Ok(ClassificationDecision::Add {
        title,
        category,
        priority,
        description,
    })
}

/// First JSON object in model output. Looks inside a code fence first;
/// prose before or after the object is ignored.
fn extract_json_object(text: &str) -> String {
    fenced_block(text)
        .and_then(first_object)
        .or_else(|| first_object(text))
        .unwrap_or_else(|| text.trim())
        .to_string()
}

/// Contents of the first ``` fence, minus an optional `json` tag.
fn fenced_block(text: &str) -> Option<&str> {
    let after = &text[text.find("```")? + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    let end = after.find("```")?;
    Some(after[..end].trim())
}

fn first_object(text: &str) -> Option<&str> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut values =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
        match values.next() {
            Some(Ok(serde_json::Value::Object(_))) => {
                Some(&text[start..start + values.byte_offset()])
            }
            _ => None,
        }
    })
}
