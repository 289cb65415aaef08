//! Embedding index and similarity search.
//!
//! One vector is stored per segment (upserted on reprocess). The index
//! backends only score and filter; ranking, scoping and query expansion live
//! in the [`SearchEngine`].

mod engine;
mod memory;
mod sqlite;

pub use engine::{SearchEngine, SearchHit, SearchRequest, SearchResponse, SearchScope};
pub use memory::MemorySearchIndex;
pub use sqlite::SqliteSearchIndex;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A segment's embedding document as stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedSegment {
    /// Segment this vector belongs to (one vector per segment).
    pub segment_id: Uuid,
    /// Owning video.
    pub video_id: String,
    /// Segment title.
    pub segment_title: String,
    /// Full segment text.
    pub segment_text: String,
    /// Segment start time in seconds.
    pub start_time: f64,
    /// Position of the segment within its video.
    pub order_index: i32,
    /// Embedding vector.
    pub embedding: Vec<f32>,
    /// Identifier of the model that produced the vector.
    pub model_id: String,
    /// When this document was indexed.
    pub indexed_at: DateTime<Utc>,
}

/// A candidate match with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredSegment {
    pub segment: IndexedSegment,
    pub similarity: f32,
}

/// Trait for embedding index backends.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Store a segment's embedding, replacing any existing vector for the
    /// same segment.
    async fn upsert(&self, doc: &IndexedSegment) -> Result<()>;

    /// Delete all documents belonging to a video. Returns the count removed.
    async fn delete_by_video(&self, video_id: &str) -> Result<usize>;

    /// Score all documents within the given videos against a query vector,
    /// keeping those strictly above `min_similarity`. Results come back in
    /// stable insertion/order_index order; the caller ranks them.
    async fn scan(
        &self,
        query_embedding: &[f32],
        video_ids: &[String],
        min_similarity: f32,
    ) -> Result<Vec<ScoredSegment>>;

    /// Total number of indexed documents.
    async fn document_count(&self) -> Result<usize>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
