//! HTTP-based answer generator using an external LLM service

use super::{AnswerGenerator, ChatMessage, OpenAiClient, PromptContext};
use crate::config::LLMServiceConfig;
use crate::error::{HazardScopeError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Answer generator backed by an OpenAI-compatible chat endpoint
pub struct HttpAnswerGenerator {
    client: Arc<OpenAiClient>,
}

impl HttpAnswerGenerator {
    /// Create from a shared client
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }

    /// Create from configuration
    pub fn from_config(config: LLMServiceConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(OpenAiClient::new(config)?)))
    }
}

#[async_trait]
impl AnswerGenerator for HttpAnswerGenerator {
    async fn generate(&self, context: &PromptContext) -> Result<String> {
        let messages = vec![
            ChatMessage::system(context.system.clone()),
            ChatMessage::user(context.user.clone()),
        ];

        let answer = self
            .client
            .chat_completion(&self.client.config().model, messages)
            .await?;

        if answer.trim().is_empty() {
            return Err(HazardScopeError::Llm(
                "generator returned an empty answer".to_string(),
            ));
        }

        Ok(answer)
    }

    fn model_name(&self) -> &str {
        &self.client.config().model
    }
}
