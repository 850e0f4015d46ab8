//! Opener generator: uses an LLM to write a first message to a lead.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::extract_json_object;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// Writes an opening message for one lead.
#[async_trait]
pub trait OpenerGenerator: Send + Sync {
    /// `lead_profile_data` is free text describing the lead (see
    /// [`Lead::profile_data`](crate::campaigns::model::Lead::profile_data)).
    async fn generate_opener(&self, lead_profile_data: &str, goal: &str)
    -> Result<String, LlmError>;
}

/// Sampling settings for message generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_tokens: 400,
        }
    }
}

/// [`OpenerGenerator`] backed by an [`LlmProvider`].
pub struct LlmOpenerGenerator {
    llm: Arc<dyn LlmProvider>,
    config: GeneratorConfig,
}

impl LlmOpenerGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: GeneratorConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl OpenerGenerator for LlmOpenerGenerator {
    async fn generate_opener(
        &self,
        lead_profile_data: &str,
        goal: &str,
    ) -> Result<String, LlmError> {
        let system_prompt = "You are an expert outreach assistant. Your task is to craft a \
             compelling, personalized opening message to an Instagram lead.\n\n\
             The message should be casual, authentic, and tailored to the lead's profile. \
             Your primary objective is to start a conversation that naturally leads towards \
             the specified goal. Do not make it sound like a generic template. Find something \
             specific in their profile to comment on.\n\n\
             Respond with a JSON object: {\"openingMessage\": \"...\"}\n\
             ONLY output the JSON object. No other text.";

        let user_prompt = format!(
            "Lead Profile Data:\n{lead_profile_data}\n\nConversation Goal:\n{goal}"
        );

        let request = CompletionRequest::new(vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.complete(request).await?;
        debug!(
            output_tokens = response.output_tokens,
            "Opener completion received"
        );

        extract_message(&response.content, "openingMessage").ok_or_else(|| {
            LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "empty opening message".to_string(),
            }
        })
    }
}

/// Read `field` from a JSON reply, falling back to the whole reply as plain
/// text. Returns `None` when the message is empty.
pub(crate) fn extract_message(text: &str, field: &str) -> Option<String> {
    let from_json = extract_json_object(text)
        .and_then(|json| serde_json::from_str::<serde_json::Value>(json).ok())
        .and_then(|value| {
            value
                .get(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });

    let message = match from_json {
        Some(message) => message,
        None => {
            if text.contains('{') {
                warn!(field, "Reply looked like JSON but had no usable field, using raw text");
            }
            text.trim().trim_matches('"').to_string()
        }
    };

    let message = message.trim();
    (!message.is_empty()).then(|| message.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::llm::provider::{CompletionResponse, FinishReason, Role};

    /// Returns a canned reply and records the last request.
    struct RecordingLlm {
        reply: String,
        last: Mutex<Option<CompletionRequest>>,
    }

    impl RecordingLlm {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            *self.last.lock().unwrap() = Some(request);
            Ok(CompletionResponse {
                content: self.reply.clone(),
                input_tokens: 10,
                output_tokens: 20,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    #[tokio::test]
    async fn parses_json_reply_and_sends_profile_and_goal() {
        let llm = RecordingLlm::new(r#"{"openingMessage": "Love your marathon pics, Kim!"}"#);
        let generator = LlmOpenerGenerator::new(llm.clone(), GeneratorConfig::default());

        let message = generator
            .generate_opener("Username: @kim\nName: Kim\nBio: Runner", "Book a call")
            .await
            .unwrap();
        assert_eq!(message, "Love your marathon pics, Kim!");

        let request = llm.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[1].content.contains("@kim"));
        assert!(request.messages[1].content.contains("Book a call"));
    }

    #[tokio::test]
    async fn accepts_plain_text_reply() {
        let llm = RecordingLlm::new("  \"Hey there, great feed!\"  ");
        let generator = LlmOpenerGenerator::new(llm, GeneratorConfig::default());
        let message = generator.generate_opener("profile", "goal!").await.unwrap();
        assert_eq!(message, "Hey there, great feed!");
    }

    #[tokio::test]
    async fn empty_message_is_invalid() {
        let llm = RecordingLlm::new(r#"```json
{"openingMessage": "   "}
```"#);
        let generator = LlmOpenerGenerator::new(llm, GeneratorConfig::default());
        let err = generator.generate_opener("profile", "goal!").await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[test]
    fn extract_message_prefers_named_field() {
        assert_eq!(
            extract_message(r#"Sure: {"personalizedMessage": "Hi!"}"#, "personalizedMessage"),
            Some("Hi!".to_string())
        );
        assert_eq!(extract_message("   ", "openingMessage"), None);
    }
}
