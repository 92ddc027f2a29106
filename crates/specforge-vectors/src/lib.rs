//! Session-scoped vector index.
//!
//! Every read and delete takes a [`SessionFilter`]; there is no way to query
//! across sessions. Two backends are provided: [`MemoryVectorIndex`] for tests
//! and single-process use, and [`QdrantVectorIndex`] for durable storage.

mod memory;
mod qdrant;

pub use memory::MemoryVectorIndex;
pub use qdrant::{QdrantConfig, QdrantVectorIndex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specforge_models::Category;

/// Error types for the vector index.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for the vector index.
pub type Result<T> = std::result::Result<T, Error>;

/// Metadata stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    /// Question text, truncated.
    pub question: String,
    pub category: Category,
}

/// A vector to insert or replace.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A stored entry returned from a lookup.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub text: String,
    /// Cosine distance, `1 - cosine similarity`.
    pub distance: f32,
    pub metadata: ChunkMetadata,
}

impl VectorMatch {
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Restricts an index operation to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFilter {
    session_id: String,
}

impl SessionFilter {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Nearest-neighbour store keyed by chunk id and partitioned by session.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the entry with the same id.
    async fn upsert(&self, entry: VectorEntry) -> Result<()>;

    /// Up to `k` entries of the filtered session, nearest first.
    async fn query(&self, vector: &[f32], k: usize, filter: &SessionFilter)
        -> Result<Vec<VectorMatch>>;

    /// Fetch a single entry. Distance is reported as zero.
    async fn get(&self, filter: &SessionFilter, id: &str) -> Result<Option<VectorMatch>>;

    /// Remove an entry. Returns whether it existed.
    async fn delete(&self, filter: &SessionFilter, id: &str) -> Result<bool>;

    /// Remove every entry of a session. Returns how many were removed.
    async fn delete_session(&self, filter: &SessionFilter) -> Result<usize>;

    /// Number of entries in a session.
    async fn count(&self, filter: &SessionFilter) -> Result<usize>;
}

/// Cosine distance between two vectors; `1.0` when either is all zeros.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
