//! Bridges a rig `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionError, CompletionModel, Message};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Wraps any rig completion model behind `LlmProvider`.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

/// Chat messages split the way rig wants them.
struct RigPrompt {
    preamble: Option<String>,
    history: Vec<Message>,
    prompt: Message,
}

/// System messages become the preamble; the final user message is the
/// prompt and everything before it is history.
fn split_messages(messages: Vec<ChatMessage>, provider: &str) -> Result<RigPrompt, LlmError> {
    let mut system = Vec::new();
    let mut turns = Vec::new();
    for ChatMessage { role, content } in messages {
        match role {
            Role::System => system.push(content),
            Role::User => turns.push(Message::user(content)),
            Role::Assistant => turns.push(Message::assistant(content)),
        }
    }

    let prompt = match turns.pop() {
        Some(prompt @ Message::User { .. }) => prompt,
        _ => {
            return Err(LlmError::RequestFailed {
                provider: provider.to_string(),
                reason: "request must end with a user message".to_string(),
            });
        }
    };

    Ok(RigPrompt {
        preamble: (!system.is_empty()).then(|| system.join("\n\n")),
        history: turns,
        prompt,
    })
}

/// Sampling knobs rig has no builder method for, in Gemini's
/// `generationConfig` shape.
fn generation_config(request: &CompletionRequest) -> Option<Value> {
    let mut config = Map::new();
    if let Some(t) = request.temperature {
        config.insert("temperature".into(), json!(t));
    }
    if let Some(p) = request.top_p {
        config.insert("topP".into(), json!(p));
    }
    if let Some(n) = request.max_tokens {
        config.insert("maxOutputTokens".into(), json!(n));
    }
    (!config.is_empty()).then(|| json!({ "generationConfig": config }))
}

fn map_error(provider: &str, e: CompletionError) -> LlmError {
    match e {
        CompletionError::ResponseError(reason) => LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason,
        },
        other => LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let params = generation_config(&request);
        let RigPrompt {
            preamble,
            history,
            prompt,
        } = split_messages(request.messages, &self.model_name)?;

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(t) = request.temperature {
            builder = builder.temperature(f64::from(t));
        }
        if let Some(n) = request.max_tokens {
            builder = builder.max_tokens(u64::from(n));
        }
        if let Some(params) = params {
            builder = builder.additional_params(params);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_error(&self.model_name, e))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect();

        let completion = CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
        };
        debug!(
            model = %self.model_name,
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "Completion finished"
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_moves_system_into_preamble() {
        let split = split_messages(
            vec![
                ChatMessage::system("be terse"),
                ChatMessage::user("hello"),
                ChatMessage::assistant("hi"),
                ChatMessage::user("classify this"),
            ],
            "test",
        )
        .unwrap();

        assert_eq!(split.preamble.as_deref(), Some("be terse"));
        assert_eq!(split.history.len(), 2);
        assert_eq!(split.prompt, Message::user("classify this"));
    }

    #[test]
    fn split_requires_trailing_user_message() {
        let err = split_messages(
            vec![ChatMessage::system("s"), ChatMessage::assistant("a")],
            "test",
        )
        .err()
        .unwrap();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
        assert!(split_messages(Vec::new(), "test").is_err());
    }

    #[test]
    fn generation_config_carries_sampling() {
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")])
            .with_temperature(0.5)
            .with_top_p(0.95);
        let params = generation_config(&req).unwrap();
        assert!((params["generationConfig"]["topP"].as_f64().unwrap() - 0.95).abs() < 1e-6);
        assert_eq!(params["generationConfig"]["temperature"], 0.5);
        assert!(params["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn generation_config_absent_without_sampling() {
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        assert!(generation_config(&req).is_none());
    }
}
