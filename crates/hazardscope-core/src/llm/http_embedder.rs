//! HTTP-based embedder using an external multimodal embedding service

use super::client::ImageUrlPayload;
use super::{EmbedInput, Embedder, ImageInput, OpenAiClient};
use crate::config::LLMServiceConfig;
use crate::error::{HazardScopeError, Result};
use crate::index::{EmbeddingVector, Modality};
use async_trait::async_trait;
use std::sync::Arc;

/// Embedder backed by an OpenAI-compatible multimodal embeddings endpoint
pub struct HttpEmbedder {
    client: Arc<OpenAiClient>,
    dimensions: usize,
}

impl HttpEmbedder {
    /// Create from a shared client
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        let dimensions = client.config().embedding_dimensions.unwrap_or(768);
        Self { client, dimensions }
    }

    /// Create from configuration
    pub fn from_config(config: LLMServiceConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(OpenAiClient::new(config)?)))
    }

    fn single(&self, mut vectors: Vec<Vec<f32>>) -> Result<Vec<f32>> {
        if vectors.is_empty() {
            return Err(HazardScopeError::Llm("no embedding returned".to_string()));
        }
        Ok(vectors.remove(0))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
        let vectors = self
            .client
            .embed(vec![EmbedInput::Text {
                text: text.to_string(),
            }])
            .await?;

        Ok(EmbeddingVector::new(
            self.single(vectors)?,
            Modality::Text,
            self.model_name(),
        ))
    }

    async fn embed_image(&self, image: &ImageInput) -> Result<EmbeddingVector> {
        let vectors = self
            .client
            .embed(vec![EmbedInput::ImageUrl {
                image_url: ImageUrlPayload {
                    url: image.as_url_payload(),
                },
            }])
            .await?;

        Ok(EmbeddingVector::new(
            self.single(vectors)?,
            Modality::Image,
            self.model_name(),
        ))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.client.config().embedding_model
    }
}
