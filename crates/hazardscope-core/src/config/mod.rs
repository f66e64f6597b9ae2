//! Configuration management

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// External model services (chat, vision, embeddings)
    #[serde(default)]
    pub llm_service: LLMServiceConfig,

    /// Dual-path retrieval and fusion
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Reranking pass
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Session store
    #[serde(default)]
    pub session: SessionConfig,

    /// Task queue and worker pool
    #[serde(default)]
    pub queue: QueueConfig,
}

/// LLM service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of the OpenAI-compatible service for chat/completions
    pub url: String,

    /// Model name for answer generation and rerank scoring
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Model name for vision analysis
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Fallback vision models, tried in order when the primary fails
    #[serde(default)]
    pub vision_fallback_models: Vec<String>,

    /// Base URL for embeddings service (can be different from LLM URL)
    #[serde(default)]
    pub embedding_url: Option<String>,

    /// Model name for multimodal embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensions (will be auto-detected if not specified)
    #[serde(default)]
    pub embedding_dimensions: Option<usize>,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl LLMServiceConfig {
    /// Get the embeddings URL (falls back to main URL if not specified)
    pub fn embeddings_url(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.url)
    }
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("HAZARDSCOPE_LLM_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            model: default_chat_model(),
            vision_model: default_vision_model(),
            vision_fallback_models: Vec::new(),
            embedding_url: std::env::var("HAZARDSCOPE_EMBEDDING_URL").ok(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: std::env::var("HAZARDSCOPE_EMBEDDING_DIMS")
                .ok()
                .and_then(|s| s.parse().ok()),
            api_key: std::env::var("HAZARDSCOPE_LLM_API_KEY").ok(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_chat_model() -> String {
    std::env::var("HAZARDSCOPE_LLM_MODEL")
        .unwrap_or_else(|_| "meta-llama/Llama-3.1-8B-Instruct".to_string())
}

fn default_vision_model() -> String {
    std::env::var("HAZARDSCOPE_VISION_MODEL").unwrap_or_else(|_| "qwen-vl-max".to_string())
}

fn default_embedding_model() -> String {
    std::env::var("HAZARDSCOPE_EMBEDDING_MODEL")
        .unwrap_or_else(|_| "multimodal-embedding-v1".to_string())
}

fn default_timeout() -> u64 {
    30
}

/// Retrieval fusion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of candidates returned after fusion
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Weight applied to the text path's normalized scores
    #[serde(default = "default_text_weight")]
    pub text_weight: f64,

    /// Weight applied to the image path's normalized scores
    #[serde(default = "default_image_weight")]
    pub image_weight: f64,

    /// Per-path oversampling factor before fusion, so dedup collapse
    /// cannot starve one path
    #[serde(default = "default_oversample")]
    pub oversample: usize,

    /// Vector index collection searched by the text path
    #[serde(default = "default_text_collection")]
    pub text_collection: String,

    /// Vector index collection searched by the image path
    #[serde(default = "default_image_collection")]
    pub image_collection: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            text_weight: default_text_weight(),
            image_weight: default_image_weight(),
            oversample: default_oversample(),
            text_collection: default_text_collection(),
            image_collection: default_image_collection(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_text_weight() -> f64 {
    0.6
}
fn default_image_weight() -> f64 {
    0.4
}
fn default_oversample() -> usize {
    2
}
fn default_text_collection() -> String {
    "hazard_text".to_string()
}
fn default_image_collection() -> String {
    "hazard_image".to_string()
}

/// Reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Number of evidence entries kept after reranking
    #[serde(default = "default_final_k")]
    pub final_k: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            final_k: default_final_k(),
        }
    }
}

fn default_final_k() -> usize {
    3
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session time-to-live in seconds
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Interval between background expiry sweeps in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_session_ttl() -> u64 {
    3600
}
fn default_sweep_interval() -> u64 {
    300
}

/// Task queue and worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of concurrent workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum execution attempts per task before it is marked failed
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Per-attempt timeout for image analysis tasks, in seconds
    #[serde(default = "default_analysis_timeout")]
    pub image_analysis_timeout_secs: u64,

    /// Per-attempt timeout for answer generation tasks, in seconds
    #[serde(default = "default_analysis_timeout")]
    pub answer_generation_timeout_secs: u64,

    /// Per-attempt timeout for combined full-query tasks, in seconds
    #[serde(default = "default_full_query_timeout")]
    pub full_query_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry_budget: default_retry_budget(),
            image_analysis_timeout_secs: default_analysis_timeout(),
            answer_generation_timeout_secs: default_analysis_timeout(),
            full_query_timeout_secs: default_full_query_timeout(),
        }
    }
}

fn default_workers() -> usize {
    2
}
fn default_retry_budget() -> u32 {
    3
}
fn default_analysis_timeout() -> u64 {
    600
}
fn default_full_query_timeout() -> u64 {
    900
}

impl Config {
    /// Load config from default path
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }
}
