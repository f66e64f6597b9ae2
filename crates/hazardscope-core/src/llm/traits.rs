//! Collaborator trait definitions
//!
//! The engine only ever talks to external models through these seams, so
//! tests can swap in deterministic implementations.

use crate::error::Result;
use crate::index::EmbeddingVector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Image supplied with a query, either by reference or inline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageInput {
    /// Publicly fetchable URL
    Url(String),
    /// Inline base64 payload, with or without a `data:` prefix
    Base64(String),
}

impl ImageInput {
    /// Wrap raw image bytes as an inline base64 payload
    pub fn from_bytes(bytes: &[u8]) -> Self {
        use base64::Engine as _;
        ImageInput::Base64(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Normalize to the `image_url` payload the OpenAI-compatible wire
    /// format expects: URLs pass through, inline payloads become data URIs.
    pub fn as_url_payload(&self) -> String {
        match self {
            ImageInput::Url(url) => url.clone(),
            ImageInput::Base64(data) => {
                if data.starts_with("data:") {
                    data.clone()
                } else {
                    format!("data:image/jpeg;base64,{}", data)
                }
            }
        }
    }
}

/// Embedding generation trait, text and image modalities
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a text query or document
    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector>;

    /// Embed an image directly, without a text derivation step
    async fn embed_image(&self, image: &ImageInput) -> Result<EmbeddingVector>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Vision analysis trait: image in, structured hazard description out
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, image: &ImageInput, prompt: &str) -> Result<String>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Pairwise relevance scoring trait used by the reranker
#[async_trait]
pub trait RelevanceModel: Send + Sync {
    /// Score each document's relevance to the query
    async fn score(
        &self,
        query: &str,
        documents: &[RelevanceDocument],
    ) -> Result<Vec<RelevanceScore>>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Document submitted for relevance scoring
#[derive(Debug, Clone)]
pub struct RelevanceDocument {
    pub id: String,
    pub text: String,
}

/// Relevance scoring result
#[derive(Debug, Clone)]
pub struct RelevanceScore {
    pub id: String,
    pub score: f64,
}

/// Final report generation trait
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, context: &PromptContext) -> Result<String>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Fully assembled prompt handed to the answer generator.
/// Assembly is owned by the engine; generation is not.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub system: String,
    pub user: String,
}
