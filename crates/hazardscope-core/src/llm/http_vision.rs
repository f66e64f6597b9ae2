//! HTTP-based vision analyzer with model fallback
//!
//! Tries the configured primary vision model first, then each fallback in
//! order. The last error is surfaced only when every model has failed.

use super::{ChatMessage, ImageInput, OpenAiClient, VisionAnalyzer};
use crate::config::LLMServiceConfig;
use crate::error::{HazardScopeError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Vision analyzer backed by an OpenAI-compatible multimodal chat endpoint
pub struct HttpVisionAnalyzer {
    client: Arc<OpenAiClient>,
    primary: String,
    fallbacks: Vec<String>,
}

impl HttpVisionAnalyzer {
    /// Create from a shared client
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        let config = client.config();
        let primary = config.vision_model.clone();
        let fallbacks = config.vision_fallback_models.clone();
        Self {
            client,
            primary,
            fallbacks,
        }
    }

    /// Create from configuration
    pub fn from_config(config: LLMServiceConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(OpenAiClient::new(config)?)))
    }

    async fn analyze_with_model(
        &self,
        model: &str,
        image: &ImageInput,
        prompt: &str,
    ) -> Result<String> {
        let messages = vec![
            ChatMessage::system(
                "You are a professional urban safety inspector. Describe the hazard shown \
                 in the photo objectively and quantitatively.",
            ),
            ChatMessage::user_with_image(prompt, image.as_url_payload()),
        ];

        let analysis = self.client.chat_completion(model, messages).await?;

        if analysis.trim().is_empty() {
            return Err(HazardScopeError::Llm(format!(
                "vision model {} returned an empty analysis",
                model
            )));
        }

        Ok(analysis)
    }
}

#[async_trait]
impl VisionAnalyzer for HttpVisionAnalyzer {
    async fn analyze(&self, image: &ImageInput, prompt: &str) -> Result<String> {
        let mut last_error = None;

        for model in std::iter::once(&self.primary).chain(self.fallbacks.iter()) {
            match self.analyze_with_model(model, image, prompt).await {
                Ok(analysis) => {
                    tracing::debug!(model = %model, "vision analysis succeeded");
                    return Ok(analysis);
                }
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "vision model failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| HazardScopeError::Llm("no vision models configured".to_string())))
    }

    fn model_name(&self) -> &str {
        &self.primary
    }
}
