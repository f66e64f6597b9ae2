//! External model integration
//!
//! Provides traits and HTTP implementations for:
//! - Multimodal embedding generation
//! - Vision analysis of hazard photos
//! - Relevance scoring for reranking
//! - Final report generation

mod client;
mod http_embedder;
mod http_generator;
mod http_reranker;
mod http_vision;
mod traits;

pub use client::{ChatMessage, ContentPart, EmbedInput, MessageContent, OpenAiClient};
pub use http_embedder::HttpEmbedder;
pub use http_generator::HttpAnswerGenerator;
pub use http_reranker::HttpRelevanceModel;
pub use http_vision::HttpVisionAnalyzer;
pub use traits::*;
