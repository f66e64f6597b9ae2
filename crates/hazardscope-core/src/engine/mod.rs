//! Two-phase query workflow orchestration
//!
//! Phase 1 (`analyze_image`) runs vision analysis and retrieval, parks the
//! evidence in a session, and returns the session id. Phase 2
//! (`complete_answer`) turns a session's evidence into the final report.
//! `query` performs both phases back-to-back without an externally visible
//! session. All model-bound work is executed on the task queue; the
//! enqueue/status paths never call a model.

mod prompt;

pub use prompt::{assemble_prompt, no_reference_answer, VISION_ANALYSIS_PROMPT};

use crate::config::Config;
use crate::error::{HazardScopeError, Result};
use crate::index::VectorIndex;
use crate::llm::{AnswerGenerator, Embedder, ImageInput, RelevanceModel, VisionAnalyzer};
use crate::queue::{ProgressHandle, Task, TaskExecutor, TaskKind, TaskQueue};
use crate::rerank::{RerankedResult, Reranker};
use crate::retrieval::FusionEngine;
use crate::session::{run_sweeper, SessionStatus, SessionStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A client query: text, image, or both
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryInput {
    pub text: Option<String>,
    pub image: Option<ImageInput>,
}

impl QueryInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }

    pub fn image(image: ImageInput) -> Self {
        Self {
            text: None,
            image: Some(image),
        }
    }

    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.image = Some(image);
        self
    }

    /// Resolve the query's modality once, at ingress. Blank text counts as
    /// absent.
    pub fn mode(&self) -> Result<QueryMode> {
        let has_text = self
            .text
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false);

        match (has_text, self.image.is_some()) {
            (true, false) => Ok(QueryMode::TextOnly),
            (false, true) => Ok(QueryMode::ImageOnly),
            (true, true) => Ok(QueryMode::Both),
            (false, false) => Err(HazardScopeError::EmptyQuery),
        }
    }
}

/// Query modality, resolved at ingress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    TextOnly,
    ImageOnly,
    Both,
}

/// Short evidence summary returned with phase-1 responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePreview {
    pub id: String,
    pub source_path: Option<String>,
    pub relevance_score: f64,
    pub snippet: String,
}

/// Characters of candidate content kept in an evidence preview
const PREVIEW_SNIPPET_CHARS: usize = 120;

impl From<&crate::rerank::RerankedCandidate> for EvidencePreview {
    fn from(entry: &crate::rerank::RerankedCandidate) -> Self {
        Self {
            id: entry.candidate.id.clone(),
            source_path: entry.candidate.source_path.clone(),
            relevance_score: entry.relevance_score,
            snippet: entry
                .candidate
                .content
                .chars()
                .take(PREVIEW_SNIPPET_CHARS)
                .collect(),
        }
    }
}

/// Phase-1 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeOutcome {
    pub session_id: String,
    /// Empty for text-only requests, which skip the vision call
    pub visual_analysis: String,
    pub evidence_preview: Vec<EvidencePreview>,
}

/// Phase-2 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub answer: String,
    pub evidence: RerankedResult,
}

/// Combined single-call response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub evidence: RerankedResult,
    pub visual_analysis: Option<String>,
}

// Task payloads and results exchanged with the queue

#[derive(Debug, Serialize, Deserialize)]
struct SessionPayload {
    session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FullQueryPayload {
    text: Option<String>,
    image: Option<ImageInput>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnalysisTaskResult {
    session_id: String,
    visual_analysis: String,
    evidence_preview: Vec<EvidencePreview>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnswerTaskResult {
    answer: String,
    evidence: RerankedResult,
}

#[derive(Debug, Serialize, Deserialize)]
struct FullQueryTaskResult {
    answer: String,
    evidence: RerankedResult,
    visual_analysis: Option<String>,
}

/// Worker-side implementation shared by every task kind
struct EngineCore {
    embedder: Arc<dyn Embedder>,
    fusion: FusionEngine,
    reranker: Reranker,
    vision: Arc<dyn VisionAnalyzer>,
    generator: Arc<dyn AnswerGenerator>,
    sessions: Arc<SessionStore>,
}

impl EngineCore {
    /// Vision analysis step: resolve the effective query text. Image
    /// queries are described by the vision model; text-only queries pass
    /// through unchanged.
    async fn resolve_query_text(
        &self,
        text: Option<&str>,
        image: Option<&ImageInput>,
    ) -> Result<(String, Option<String>)> {
        match image {
            Some(image) => {
                let analysis = self.vision.analyze(image, VISION_ANALYSIS_PROMPT).await?;
                Ok((analysis.clone(), Some(analysis)))
            }
            None => {
                let text = text
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or(HazardScopeError::EmptyQuery)?;
                Ok((text.to_string(), None))
            }
        }
    }

    /// Dual-path retrieval plus rerank against the resolved query text
    async fn retrieve_evidence(
        &self,
        resolved_text: &str,
        image: Option<&ImageInput>,
        progress: &ProgressHandle,
    ) -> Result<RerankedResult> {
        // The image path degrades to text-only when the image cannot be
        // embedded; the analysis text already captures its content.
        let image_vector = match image {
            Some(image) => match self.embedder.embed_image(image).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    tracing::warn!(error = %e, "image embedding failed, text path only");
                    None
                }
            },
            None => None,
        };
        progress.set(60).await;

        let top_k = self.fusion.config().top_k;
        let fused = self
            .fusion
            .search(Some(resolved_text), image_vector.as_ref(), top_k)
            .await?;
        progress.set(80).await;

        self.reranker.rerank(resolved_text, fused).await
    }

    /// Generate the final report, degrading to the bare analysis when the
    /// knowledge base had nothing relevant
    async fn generate_answer(
        &self,
        query_text: Option<&str>,
        visual_analysis: Option<&str>,
        evidence: &RerankedResult,
    ) -> Result<String> {
        if evidence.is_empty() {
            let analysis = visual_analysis
                .or(query_text)
                .unwrap_or("No analysis available.");
            return Ok(no_reference_answer(analysis));
        }

        let context = assemble_prompt(query_text, visual_analysis, evidence);
        self.generator
            .generate(&context)
            .await
            .map_err(|e| HazardScopeError::GenerationFailure(e.to_string()))
    }

    async fn run_image_analysis(
        &self,
        session_id: &str,
        progress: &ProgressHandle,
    ) -> Result<AnalysisTaskResult> {
        let session = self.sessions.get(session_id).await?;

        let (resolved_text, visual_analysis) = self
            .resolve_query_text(session.query_text.as_deref(), session.image.as_ref())
            .await?;
        progress.set(40).await;

        let evidence = self
            .retrieve_evidence(&resolved_text, session.image.as_ref(), progress)
            .await?;

        let evidence_preview: Vec<EvidencePreview> =
            evidence.entries.iter().map(EvidencePreview::from).collect();

        let stored_analysis = visual_analysis.clone();
        self.sessions
            .update(session_id, move |s| {
                s.visual_analysis = stored_analysis;
                s.evidence = Some(evidence);
                s.status = SessionStatus::Analyzed;
            })
            .await?;

        Ok(AnalysisTaskResult {
            session_id: session_id.to_string(),
            visual_analysis: visual_analysis.unwrap_or_default(),
            evidence_preview,
        })
    }

    async fn run_answer_generation(
        &self,
        session_id: &str,
        progress: &ProgressHandle,
    ) -> Result<AnswerTaskResult> {
        let session = self.sessions.get(session_id).await?;
        if session.status != SessionStatus::Analyzed {
            return Err(HazardScopeError::SessionExpired(session_id.to_string()));
        }

        let evidence = session.evidence.clone().unwrap_or_default();
        progress.set(30).await;

        let answer = self
            .generate_answer(
                session.query_text.as_deref(),
                session.visual_analysis.as_deref(),
                &evidence,
            )
            .await?;
        progress.set(90).await;

        self.sessions
            .update(session_id, |s| s.status = SessionStatus::Completed)
            .await?;

        Ok(AnswerTaskResult { answer, evidence })
    }

    async fn run_full_query(
        &self,
        payload: FullQueryPayload,
        progress: &ProgressHandle,
    ) -> Result<FullQueryTaskResult> {
        let (resolved_text, visual_analysis) = self
            .resolve_query_text(payload.text.as_deref(), payload.image.as_ref())
            .await?;
        progress.set(30).await;

        let evidence = self
            .retrieve_evidence(&resolved_text, payload.image.as_ref(), progress)
            .await?;

        let answer = self
            .generate_answer(
                payload.text.as_deref(),
                visual_analysis.as_deref(),
                &evidence,
            )
            .await?;

        Ok(FullQueryTaskResult {
            answer,
            evidence,
            visual_analysis,
        })
    }
}

#[async_trait]
impl TaskExecutor for EngineCore {
    async fn execute(
        &self,
        kind: TaskKind,
        payload: &Value,
        progress: &ProgressHandle,
    ) -> Result<Value> {
        match kind {
            TaskKind::ImageAnalysis => {
                let payload: SessionPayload = serde_json::from_value(payload.clone())?;
                let result = self
                    .run_image_analysis(&payload.session_id, progress)
                    .await?;
                Ok(serde_json::to_value(result)?)
            }
            TaskKind::AnswerGeneration => {
                let payload: SessionPayload = serde_json::from_value(payload.clone())?;
                let result = self
                    .run_answer_generation(&payload.session_id, progress)
                    .await?;
                Ok(serde_json::to_value(result)?)
            }
            TaskKind::FullQuery => {
                let payload: FullQueryPayload = serde_json::from_value(payload.clone())?;
                let result = self.run_full_query(payload, progress).await?;
                Ok(serde_json::to_value(result)?)
            }
        }
    }
}

/// The public engine: sessions, queue, and the retrieval/generation pipeline
pub struct HazardEngine {
    queue: TaskQueue,
    sessions: Arc<SessionStore>,
    sweeper: tokio::task::JoinHandle<()>,
}

impl HazardEngine {
    /// Wire the engine from a configuration and its collaborators
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        vision: Arc<dyn VisionAnalyzer>,
        relevance: Arc<dyn RelevanceModel>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(&config.session));

        let core = Arc::new(EngineCore {
            embedder: embedder.clone(),
            fusion: FusionEngine::new(embedder, index, config.retrieval.clone()),
            reranker: Reranker::new(relevance, config.rerank.clone()),
            vision,
            generator,
            sessions: sessions.clone(),
        });

        let queue = TaskQueue::start(config.queue.clone(), core);
        let sweeper = tokio::spawn(run_sweeper(
            sessions.clone(),
            Duration::from_secs(config.session.sweep_interval_secs.max(1)),
        ));

        Self {
            queue,
            sessions,
            sweeper,
        }
    }

    /// Phase 1: analyze the query (vision + retrieval + rerank) and park the
    /// evidence in a new session
    pub async fn analyze_image(&self, input: QueryInput) -> Result<AnalyzeOutcome> {
        let mode = input.mode()?;
        tracing::debug!(?mode, "analyze request");

        let session = self.sessions.create_with_generated_id().await;
        self.sessions
            .update(&session.session_id, move |s| {
                s.query_text = input.text;
                s.image = input.image;
            })
            .await?;

        let payload = serde_json::to_value(SessionPayload {
            session_id: session.session_id,
        })?;
        let task_id = self.queue.enqueue(TaskKind::ImageAnalysis, payload).await?;
        let task = self.queue.wait(&task_id).await?;

        let result: AnalysisTaskResult = serde_json::from_value(finished_result(task)?)?;
        Ok(AnalyzeOutcome {
            session_id: result.session_id,
            visual_analysis: result.visual_analysis,
            evidence_preview: result.evidence_preview,
        })
    }

    /// Phase 2: generate the final report from a session created by
    /// [`Self::analyze_image`]. Fails with `SessionExpired` when the session
    /// is missing, expired, or already consumed; a new session is never
    /// created here.
    pub async fn complete_answer(&self, session_id: &str) -> Result<CompletionOutcome> {
        let session = self.sessions.get(session_id).await?;
        if session.status != SessionStatus::Analyzed {
            return Err(HazardScopeError::SessionExpired(session_id.to_string()));
        }

        let payload = serde_json::to_value(SessionPayload {
            session_id: session_id.to_string(),
        })?;
        let task_id = self
            .queue
            .enqueue(TaskKind::AnswerGeneration, payload)
            .await?;
        let task = self.queue.wait(&task_id).await?;

        let result: AnswerTaskResult = serde_json::from_value(finished_result(task)?)?;
        Ok(CompletionOutcome {
            answer: result.answer,
            evidence: result.evidence,
        })
    }

    /// Combined single-call path: both phases back-to-back, no session
    /// visible across client calls
    pub async fn query(&self, input: QueryInput) -> Result<QueryOutcome> {
        let mode = input.mode()?;
        tracing::debug!(?mode, "combined query request");

        let payload = serde_json::to_value(FullQueryPayload {
            text: input.text,
            image: input.image,
        })?;
        let task_id = self.queue.enqueue(TaskKind::FullQuery, payload).await?;
        let task = self.queue.wait(&task_id).await?;

        let result: FullQueryTaskResult = serde_json::from_value(finished_result(task)?)?;
        Ok(QueryOutcome {
            answer: result.answer,
            evidence: result.evidence,
            visual_analysis: result.visual_analysis,
        })
    }

    /// Enqueue a raw task; returns immediately with its id
    pub async fn enqueue_task(&self, kind: TaskKind, payload: Value) -> Result<String> {
        self.queue.enqueue(kind, payload).await
    }

    /// Observe a task. Absence of a terminal status means "still running";
    /// callers poll with their own backoff.
    pub async fn task_status(&self, task_id: &str) -> Result<Task> {
        self.queue.status(task_id).await
    }

    /// Cancel a task (see [`TaskQueue::cancel`] for the exact semantics)
    pub async fn cancel_task(&self, task_id: &str) -> bool {
        self.queue.cancel(task_id).await
    }

    /// Session store handle, for observability
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Stop the worker pool and the expiry sweeper
    pub fn shutdown(&self) {
        self.queue.shutdown();
        self.sweeper.abort();
    }
}

fn finished_result(task: Task) -> Result<Value> {
    match task.status {
        crate::queue::TaskStatus::Finished => task
            .result
            .ok_or_else(|| HazardScopeError::TaskFailed("task finished without a result".into())),
        _ => Err(HazardScopeError::TaskFailed(
            task.error
                .unwrap_or_else(|| "task did not finish".to_string()),
        )),
    }
}
