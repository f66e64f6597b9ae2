//! In-memory vector index
//!
//! Exact cosine scan over named collections. Distance is reported as
//! `1.0 - cosine_similarity`, so smaller is closer.

use super::{Candidate, EmbeddingVector, Modality, VectorIndex};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A document stored in the index, with its precomputed embedding
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub id: String,
    pub modality: Modality,
    pub content: String,
    pub source_path: Option<String>,
    pub embedding: Vec<f32>,
}

/// In-memory index over named collections
#[derive(Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Vec<IndexedDocument>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append documents to a collection, creating it if needed
    pub async fn insert(&self, collection: &str, documents: Vec<IndexedDocument>) {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn search(
        &self,
        collection: &str,
        vector: &EmbeddingVector,
        top_k: usize,
    ) -> Result<Vec<Candidate>> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<Candidate> = documents
            .iter()
            .map(|doc| Candidate {
                id: doc.id.clone(),
                modality: doc.modality,
                content: doc.content.clone(),
                source_path: doc.source_path.clone(),
                distance: 1.0 - cosine_similarity(&vector.values, &doc.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map(|d| d.len()).unwrap_or(0))
    }
}

/// Cosine similarity between two vectors; 0.0 for mismatched or zero-length
/// inputs
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, embedding: Vec<f32>) -> IndexedDocument {
        IndexedDocument {
            id: id.to_string(),
            modality: Modality::Text,
            content: format!("content of {}", id),
            source_path: None,
            embedding,
        }
    }

    fn query(values: Vec<f32>) -> EmbeddingVector {
        EmbeddingVector::new(values, Modality::Text, "test")
    }

    #[tokio::test]
    async fn test_search_orders_by_distance() {
        let index = MemoryIndex::new();
        index
            .insert(
                "docs",
                vec![
                    doc("far", vec![0.0, 1.0]),
                    doc("near", vec![1.0, 0.0]),
                    doc("mid", vec![1.0, 1.0]),
                ],
            )
            .await;

        let hits = index.search("docs", &query(vec![1.0, 0.0]), 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "near");
        assert!(hits[0].distance < hits[1].distance);
        assert!(hits[1].distance <= hits[2].distance);
    }

    #[tokio::test]
    async fn test_search_truncates_to_top_k() {
        let index = MemoryIndex::new();
        index
            .insert(
                "docs",
                (0..10).map(|i| doc(&format!("d{}", i), vec![1.0, i as f32])).collect(),
            )
            .await;

        let hits = index.search("docs", &query(vec![1.0, 0.0]), 4).await.unwrap();
        assert_eq!(hits.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty_not_error() {
        let index = MemoryIndex::new();
        let hits = index.search("nope", &query(vec![1.0]), 5).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(index.count("nope").await.unwrap(), 0);
    }

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
