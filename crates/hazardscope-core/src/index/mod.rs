//! Vector index abstraction
//!
//! The engine treats the index as read-mostly: the write path belongs to
//! ingestion and is limited to seeding collections. Reads are safe for
//! unlimited concurrency.

mod memory;

pub use memory::{IndexedDocument, MemoryIndex};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Modality of an embedding or stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Image,
}

/// Fixed-length embedding tagged with its modality and producing model.
/// Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub values: Vec<f32>,
    pub modality: Modality,
    pub source: String,
}

impl EmbeddingVector {
    pub fn new(values: Vec<f32>, modality: Modality, source: impl Into<String>) -> Self {
        Self {
            values,
            modality,
            source: source.into(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.values.len()
    }
}

/// A nearest-neighbor hit from one retrieval path.
///
/// The distance is path-local: distances from different collections are not
/// comparable until the fusion layer normalizes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub modality: Modality,
    pub content: String,
    pub source_path: Option<String>,
    pub distance: f32,
}

/// Nearest-neighbor search over named collections
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return the `top_k` nearest stored documents for `vector`.
    ///
    /// An empty or missing collection yields an empty result, not an error.
    async fn search(
        &self,
        collection: &str,
        vector: &EmbeddingVector,
        top_k: usize,
    ) -> Result<Vec<Candidate>>;

    /// Number of documents stored in a collection
    async fn count(&self, collection: &str) -> Result<usize>;
}
