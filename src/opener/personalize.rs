//! Template personalization: rewrite a message template for one lead.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::{LlmError, ValidationError};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

use super::generator::{GeneratorConfig, extract_message};

/// Personalizes a message template for a lead.
#[async_trait]
pub trait MessagePersonalizer: Send + Sync {
    async fn personalize(
        &self,
        lead_profile_data: &str,
        message_template: &str,
    ) -> Result<String, LlmError>;
}

/// Reject blank inputs before any model call.
pub fn validate_personalize_input(
    lead_profile_data: &str,
    message_template: &str,
) -> Result<(), ValidationError> {
    if lead_profile_data.trim().is_empty() || message_template.trim().is_empty() {
        return Err(ValidationError::EmptyPersonalizeInput);
    }
    Ok(())
}

/// [`MessagePersonalizer`] backed by an [`LlmProvider`].
pub struct LlmPersonalizer {
    llm: Arc<dyn LlmProvider>,
    config: GeneratorConfig,
}

impl LlmPersonalizer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: GeneratorConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl MessagePersonalizer for LlmPersonalizer {
    async fn personalize(
        &self,
        lead_profile_data: &str,
        message_template: &str,
    ) -> Result<String, LlmError> {
        let system_prompt = "You personalize outreach messages for Instagram leads. Based on \
             the lead's profile data and a message template, write a personalized message \
             that is likely to increase engagement and booking rates. Keep the intent of \
             the template.\n\n\
             Respond with a JSON object: {\"personalizedMessage\": \"...\"}\n\
             ONLY output the JSON object. No other text.";

        let user_prompt = format!(
            "Lead Profile Data:\n{lead_profile_data}\n\nMessage Template:\n{message_template}"
        );

        let request = CompletionRequest::new(vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.complete(request).await?;
        let message = extract_message(&response.content, "personalizedMessage").ok_or_else(
            || LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "empty personalized message".to_string(),
            },
        )?;

        info!(chars = message.len(), "Message personalized");
        Ok(message)
    }
}
