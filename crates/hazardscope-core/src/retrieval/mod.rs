//! Dual-path retrieval fusion engine
//!
//! Runs the text path (embed the resolved query text, search the text
//! collection) and the image path (search the image collection with a
//! precomputed image vector) independently, then merges them into one
//! ranked candidate list.

mod fusion;

pub use fusion::{fuse, FusedCandidate, FusedResult};

use crate::config::RetrievalConfig;
use crate::error::{HazardScopeError, Result};
use crate::index::{Candidate, EmbeddingVector, VectorIndex};
use crate::llm::Embedder;
use std::sync::Arc;

/// Retrieval fusion engine over an embedder and a vector index
pub struct FusionEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl FusionEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Dual-path search returning at most `top_k` fused candidates.
    ///
    /// At least one of `query_text` / `query_image_vector` must be present.
    /// Each path is oversampled before fusion so dedup collapse cannot
    /// starve one path. An empty collection yields an empty path, not an
    /// error; when both paths come back empty the fused result is empty and
    /// the caller decides what that means.
    pub async fn search(
        &self,
        query_text: Option<&str>,
        query_image_vector: Option<&EmbeddingVector>,
        top_k: usize,
    ) -> Result<FusedResult> {
        let text_query = query_text.map(str::trim).filter(|t| !t.is_empty());

        if text_query.is_none() && query_image_vector.is_none() {
            return Err(HazardScopeError::EmptyQuery);
        }

        let fetch = top_k.saturating_mul(self.config.oversample.max(1));

        // Both paths run independently
        let (text_hits, image_hits) = futures::join!(
            async {
                match text_query {
                    Some(text) => self.text_path(text, fetch).await,
                    None => Ok(Vec::new()),
                }
            },
            async {
                // The image path degrades to empty on failure instead of
                // discarding text-path results that are already in hand.
                match query_image_vector {
                    Some(vector) => match self
                        .index
                        .search(&self.config.image_collection, vector, fetch)
                        .await
                    {
                        Ok(hits) => hits,
                        Err(e) => {
                            tracing::warn!(error = %e, "image path failed, continuing with text path only");
                            Vec::new()
                        }
                    },
                    None => Vec::new(),
                }
            }
        );
        let text_hits = text_hits?;

        tracing::debug!(
            text_hits = text_hits.len(),
            image_hits = image_hits.len(),
            top_k,
            "fusing retrieval paths"
        );

        Ok(fuse(
            text_hits,
            image_hits,
            self.config.text_weight,
            self.config.image_weight,
            top_k,
        ))
    }

    async fn text_path(&self, text: &str, fetch: usize) -> Result<Vec<Candidate>> {
        let vector = self
            .embedder
            .embed_text(text)
            .await
            .map_err(|e| HazardScopeError::RetrievalFailure(e.to_string()))?;

        self.index
            .search(&self.config.text_collection, &vector, fetch)
            .await
            .map_err(|e| HazardScopeError::RetrievalFailure(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexedDocument, MemoryIndex, Modality};
    use crate::llm::ImageInput;
    use async_trait::async_trait;

    /// Deterministic embedder: maps known phrases to fixed unit vectors
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
            let values = if text.contains("wall") {
                vec![1.0, 0.0, 0.0]
            } else {
                vec![0.0, 1.0, 0.0]
            };
            Ok(EmbeddingVector::new(values, Modality::Text, "stub"))
        }

        async fn embed_image(&self, _image: &ImageInput) -> Result<EmbeddingVector> {
            Ok(EmbeddingVector::new(
                vec![0.0, 0.0, 1.0],
                Modality::Image,
                "stub",
            ))
        }

        fn dimensions(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    async fn seeded_index() -> Arc<MemoryIndex> {
        let index = MemoryIndex::new();
        index
            .insert(
                "hazard_text",
                vec![
                    IndexedDocument {
                        id: "wall-spec".to_string(),
                        modality: Modality::Text,
                        content: "load-bearing wall crack tolerances".to_string(),
                        source_path: Some("standards/walls.md".to_string()),
                        embedding: vec![0.9, 0.1, 0.0],
                    },
                    IndexedDocument {
                        id: "road-spec".to_string(),
                        modality: Modality::Text,
                        content: "road surface defects".to_string(),
                        source_path: None,
                        embedding: vec![0.1, 0.9, 0.0],
                    },
                ],
            )
            .await;
        index
            .insert(
                "hazard_image",
                vec![IndexedDocument {
                    id: "crack-photo".to_string(),
                    modality: Modality::Image,
                    content: "reference photo of a wall crack".to_string(),
                    source_path: Some("photos/crack.jpg".to_string()),
                    embedding: vec![0.0, 0.0, 1.0],
                }],
            )
            .await;
        Arc::new(index)
    }

    fn engine(index: Arc<MemoryIndex>) -> FusionEngine {
        FusionEngine::new(Arc::new(StubEmbedder), index, RetrievalConfig::default())
    }

    #[tokio::test]
    async fn test_text_only_search_uses_text_path_only() {
        let engine = engine(seeded_index().await);
        let fused = engine.search(Some("wall crack"), None, 5).await.unwrap();

        assert!(!fused.is_empty());
        assert_eq!(fused.candidates[0].candidate.id, "wall-spec");
        assert!(fused.candidates.iter().all(|c| c.image_score.is_none()));
    }

    #[tokio::test]
    async fn test_dual_path_search_merges_both_collections() {
        let engine = engine(seeded_index().await);
        let image_vector = EmbeddingVector::new(vec![0.0, 0.0, 1.0], Modality::Image, "stub");

        let fused = engine
            .search(Some("wall crack"), Some(&image_vector), 5)
            .await
            .unwrap();

        let ids: Vec<&str> = fused
            .candidates
            .iter()
            .map(|c| c.candidate.id.as_str())
            .collect();
        assert!(ids.contains(&"wall-spec"));
        assert!(ids.contains(&"crack-photo"));
    }

    #[tokio::test]
    async fn test_no_inputs_is_empty_query() {
        let engine = engine(seeded_index().await);
        let err = engine.search(None, None, 5).await.unwrap_err();
        assert!(matches!(err, HazardScopeError::EmptyQuery));

        let err = engine.search(Some("   "), None, 5).await.unwrap_err();
        assert!(matches!(err, HazardScopeError::EmptyQuery));
    }

    #[tokio::test]
    async fn test_empty_collections_yield_empty_result() {
        let engine = engine(Arc::new(MemoryIndex::new()));
        let fused = engine.search(Some("anything"), None, 5).await.unwrap();
        assert!(fused.is_empty());
    }
}
