//! Reranking pass over fused retrieval candidates
//!
//! A second, independent ranking signal: every fused candidate is re-scored
//! against the resolved query text by a pairwise relevance model, and the
//! final order follows the relevance score alone. The fusion score is kept
//! on each entry for observability but has no influence on the order.

use crate::config::RerankConfig;
use crate::error::Result;
use crate::index::Candidate;
use crate::llm::{RelevanceDocument, RelevanceModel};
use crate::retrieval::FusedResult;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One evidence entry after reranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankedCandidate {
    pub candidate: Candidate,
    /// Final rank, starting at 1
    pub rank: usize,
    /// Relevance score from the pairwise model; non-increasing by rank
    pub relevance_score: f64,
    /// Fusion score retained as metadata
    pub fusion_score: f64,
}

/// Final ordered evidence set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RerankedResult {
    pub entries: Vec<RerankedCandidate>,
}

impl RerankedResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Reranker over a pairwise relevance model
pub struct Reranker {
    model: Arc<dyn RelevanceModel>,
    config: RerankConfig,
}

impl Reranker {
    pub fn new(model: Arc<dyn RelevanceModel>, config: RerankConfig) -> Self {
        Self { model, config }
    }

    /// Re-score fused candidates against the resolved query text.
    ///
    /// For image-only queries the caller passes the vision analysis output,
    /// never the raw image. Empty input returns an empty result without
    /// touching the model. Output is truncated to the configured evidence
    /// count.
    pub async fn rerank(&self, query_text: &str, fused: FusedResult) -> Result<RerankedResult> {
        if fused.is_empty() {
            return Ok(RerankedResult::default());
        }

        // Verbose vision analyses drown the pairwise model; score against
        // the condensed problem title instead.
        let title = extract_problem_title(query_text);
        tracing::debug!(title = %title, candidates = fused.len(), "reranking");

        let documents: Vec<RelevanceDocument> = fused
            .candidates
            .iter()
            .map(|c| RelevanceDocument {
                id: c.candidate.id.clone(),
                text: c.candidate.content.clone(),
            })
            .collect();

        let scores = self.model.score(&title, &documents).await?;
        let score_by_id: std::collections::HashMap<&str, f64> = scores
            .iter()
            .map(|s| (s.id.as_str(), s.score))
            .collect();

        let mut entries: Vec<RerankedCandidate> = fused
            .candidates
            .into_iter()
            .map(|fc| {
                let relevance_score = score_by_id
                    .get(fc.candidate.id.as_str())
                    .copied()
                    .unwrap_or(0.0);
                RerankedCandidate {
                    candidate: fc.candidate,
                    rank: 0,
                    relevance_score,
                    fusion_score: fc.score,
                }
            })
            .collect();

        // Stable sort: equal relevance scores keep fusion order
        entries.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries.truncate(self.config.final_k);

        for (idx, entry) in entries.iter_mut().enumerate() {
            entry.rank = idx + 1;
        }

        Ok(RerankedResult { entries })
    }
}

lazy_static! {
    /// Second bold span in analyses shaped like `**category** **problem**`
    static ref BOLD_TITLE: Regex =
        Regex::new(r"(?s)\*\*([^*]+)\*\*.*?\*\*([^*]+)\*\*").unwrap();
}

/// Lines naming a problem category in structured hazard analyses
const TITLE_KEYWORDS: &[&str] = &["问题", "隐患", "改造", "数量"];

/// Maximum characters of the fallback title prefix
const TITLE_PREFIX_CHARS: usize = 50;

/// Condense a (possibly verbose, markdown-formatted) analysis into a short
/// problem title suitable as the query side of a relevance pair.
pub fn extract_problem_title(query: &str) -> String {
    // Structured analyses carry the problem name in the second bold span
    if let Some(captures) = BOLD_TITLE.captures(query) {
        if let Some(title) = captures.get(2) {
            let title = title.as_str().trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
    }

    // A short line mentioning a problem keyword is a good stand-in
    for line in query.lines() {
        let line = line.trim().replace('*', "");
        if TITLE_KEYWORDS.iter().any(|kw| line.contains(kw))
            && !line.is_empty()
            && line.chars().count() < TITLE_PREFIX_CHARS
        {
            return line;
        }
    }

    // Last resort: a cleaned prefix of the query itself
    let cleaned: String = query
        .replace('*', "")
        .replace('\n', " ")
        .trim()
        .to_string();
    let prefix: String = cleaned.chars().take(TITLE_PREFIX_CHARS).collect();
    if cleaned.chars().count() > TITLE_PREFIX_CHARS {
        format!("{}...", prefix)
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HazardScopeError;
    use crate::index::Modality;
    use crate::llm::RelevanceScore;
    use crate::retrieval::FusedCandidate;
    use async_trait::async_trait;

    /// Scores documents by a fixed table; records whether it was called
    struct TableModel {
        scores: Vec<(&'static str, f64)>,
        called: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl RelevanceModel for TableModel {
        async fn score(
            &self,
            _query: &str,
            documents: &[RelevanceDocument],
        ) -> Result<Vec<RelevanceScore>> {
            self.called
                .store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(documents
                .iter()
                .map(|d| RelevanceScore {
                    id: d.id.clone(),
                    score: self
                        .scores
                        .iter()
                        .find(|(id, _)| *id == d.id)
                        .map(|(_, s)| *s)
                        .unwrap_or(0.0),
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "table"
        }
    }

    /// A model that always errors, to verify propagation
    struct FailingModel;

    #[async_trait]
    impl RelevanceModel for FailingModel {
        async fn score(
            &self,
            _query: &str,
            _documents: &[RelevanceDocument],
        ) -> Result<Vec<RelevanceScore>> {
            Err(HazardScopeError::Llm("scoring unavailable".to_string()))
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn fused(entries: &[(&str, f64)]) -> FusedResult {
        FusedResult {
            candidates: entries
                .iter()
                .map(|(id, score)| FusedCandidate {
                    candidate: Candidate {
                        id: id.to_string(),
                        modality: Modality::Text,
                        content: format!("content {}", id),
                        source_path: None,
                        distance: 0.1,
                    },
                    score: *score,
                    text_score: Some(*score),
                    image_score: None,
                })
                .collect(),
        }
    }

    fn reranker(scores: Vec<(&'static str, f64)>, final_k: usize) -> Reranker {
        Reranker::new(
            Arc::new(TableModel {
                scores,
                called: std::sync::atomic::AtomicBool::new(false),
            }),
            RerankConfig { final_k },
        )
    }

    #[tokio::test]
    async fn test_order_follows_relevance_not_fusion() {
        // Fusion likes a best; the relevance model disagrees
        let reranker = reranker(vec![("a", 0.1), ("b", 0.9), ("c", 0.5)], 10);
        let result = reranker
            .rerank("query", fused(&[("a", 0.9), ("b", 0.5), ("c", 0.2)]))
            .await
            .unwrap();

        let ids: Vec<&str> = result.entries.iter().map(|e| e.candidate.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        // Monotonically non-increasing by rank, ranks start at 1
        for window in result.entries.windows(2) {
            assert!(window[0].relevance_score >= window[1].relevance_score);
            assert_eq!(window[1].rank, window[0].rank + 1);
        }
        assert_eq!(result.entries[0].rank, 1);

        // Fusion score survives as metadata
        assert!((result.entries[0].fusion_score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_truncates_to_final_k() {
        let reranker = reranker(vec![("a", 0.9), ("b", 0.8), ("c", 0.7), ("d", 0.6)], 2);
        let result = reranker
            .rerank("query", fused(&[("a", 0.1), ("b", 0.2), ("c", 0.3), ("d", 0.4)]))
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.entries[0].candidate.id, "a");
    }

    #[tokio::test]
    async fn test_empty_input_skips_model() {
        let model = Arc::new(TableModel {
            scores: vec![],
            called: std::sync::atomic::AtomicBool::new(false),
        });
        let reranker = Reranker::new(model.clone(), RerankConfig::default());
        let result = reranker.rerank("query", FusedResult::default()).await.unwrap();
        assert!(result.is_empty());
        assert!(!model.called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_model_errors_propagate() {
        let reranker = Reranker::new(Arc::new(FailingModel), RerankConfig::default());
        let err = reranker
            .rerank("query", fused(&[("a", 0.5)]))
            .await
            .unwrap_err();
        assert!(matches!(err, HazardScopeError::Llm(_)));
    }

    #[test]
    fn test_extract_title_from_bold_spans() {
        let analysis = "**二、 小区与公共空间**\n**公共区域无障碍与步行道问题**\n\n图片显示路面破损严重。";
        assert_eq!(extract_problem_title(analysis), "公共区域无障碍与步行道问题");
    }

    #[test]
    fn test_extract_title_from_keyword_line() {
        let analysis = "现场照片记录\n外墙脱落隐患\n其他说明文字";
        assert_eq!(extract_problem_title(analysis), "外墙脱落隐患");
    }

    #[test]
    fn test_extract_title_falls_back_to_prefix() {
        let short = "承重墙有裂缝";
        assert_eq!(extract_problem_title(short), "承重墙有裂缝");

        let long = "a".repeat(120);
        let title = extract_problem_title(&long);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 53);
    }
}
