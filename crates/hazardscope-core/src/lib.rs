//! HazardScope Core Library
//!
//! Core functionality for hazardscope, a multimodal RAG engine answering
//! urban safety-hazard queries.
//!
//! # Features
//! - Dual-path retrieval (text and image vectors) with deterministic
//!   score fusion
//! - Cross-model reranking of fused candidates
//! - Two-phase asynchronous query workflow (vision analysis, then answer
//!   completion) bridged by a TTL session store
//! - In-process FIFO task queue with a retrying worker pool
//! - Trait seams for external collaborators: embedding provider, vector
//!   index, vision analyzer, answer generator

pub mod config;
pub mod engine;
pub mod error;
pub mod ids;
pub mod index;
pub mod llm;
pub mod queue;
pub mod rerank;
pub mod retrieval;
pub mod session;

pub use config::{Config, LLMServiceConfig, QueueConfig, RerankConfig, RetrievalConfig, SessionConfig};
pub use engine::{
    AnalyzeOutcome, CompletionOutcome, EvidencePreview, HazardEngine, QueryInput, QueryMode,
    QueryOutcome, VISION_ANALYSIS_PROMPT,
};
pub use error::{Error, HazardScopeError, Result};
pub use index::{Candidate, EmbeddingVector, IndexedDocument, MemoryIndex, Modality, VectorIndex};
pub use llm::{
    AnswerGenerator, ChatMessage, Embedder, HttpAnswerGenerator, HttpEmbedder,
    HttpRelevanceModel, HttpVisionAnalyzer, ImageInput, OpenAiClient, PromptContext,
    RelevanceDocument, RelevanceModel, RelevanceScore, VisionAnalyzer,
};
pub use queue::{ProgressHandle, Task, TaskExecutor, TaskKind, TaskQueue, TaskStatus};
pub use rerank::{extract_problem_title, RerankedCandidate, RerankedResult, Reranker};
pub use retrieval::{FusedCandidate, FusedResult, FusionEngine};
pub use session::{Session, SessionStatus, SessionStore};

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "hazardscope";
