//! In-memory search index implementation.
//!
//! Documents are kept in insertion order so ranking ties break stably.

use super::{cosine_similarity, IndexedSegment, ScoredSegment, SearchIndex};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::RwLock;

/// In-memory embedding index.
#[derive(Default)]
pub struct MemorySearchIndex {
    documents: RwLock<Vec<IndexedSegment>>,
}

impl MemorySearchIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn upsert(&self, doc: &IndexedSegment) -> Result<()> {
        let mut docs = self.documents.write().unwrap();
        match docs.iter_mut().find(|d| d.segment_id == doc.segment_id) {
            Some(existing) => *existing = doc.clone(),
            None => docs.push(doc.clone()),
        }
        Ok(())
    }

    async fn delete_by_video(&self, video_id: &str) -> Result<usize> {
        let mut docs = self.documents.write().unwrap();
        let initial_len = docs.len();
        docs.retain(|d| d.video_id != video_id);
        Ok(initial_len - docs.len())
    }

    async fn scan(
        &self,
        query_embedding: &[f32],
        video_ids: &[String],
        min_similarity: f32,
    ) -> Result<Vec<ScoredSegment>> {
        let docs = self.documents.read().unwrap();

        let results = docs
            .iter()
            .filter(|d| video_ids.contains(&d.video_id))
            .map(|d| ScoredSegment {
                similarity: cosine_similarity(query_embedding, &d.embedding),
                segment: d.clone(),
            })
            .filter(|r| r.similarity > min_similarity)
            .collect();

        Ok(results)
    }

    async fn document_count(&self) -> Result<usize> {
        Ok(self.documents.read().unwrap().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn doc(video_id: &str, order_index: i32, embedding: Vec<f32>) -> IndexedSegment {
        IndexedSegment {
            segment_id: Uuid::new_v4(),
            video_id: video_id.to_string(),
            segment_title: "Chapter".to_string(),
            segment_text: "Some text".to_string(),
            start_time: order_index as f64 * 30.0,
            order_index,
            embedding,
            model_id: "test-model".to_string(),
            indexed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_segment_id() {
        let index = MemorySearchIndex::new();
        let mut d = doc("v1", 0, vec![1.0, 0.0]);
        index.upsert(&d).await.unwrap();

        d.embedding = vec![0.0, 1.0];
        index.upsert(&d).await.unwrap();

        assert_eq!(index.document_count().await.unwrap(), 1);
        let hits = index
            .scan(&[0.0, 1.0], &["v1".to_string()], 0.5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_scan_filters_by_video_and_threshold() {
        let index = MemorySearchIndex::new();
        index.upsert(&doc("v1", 0, vec![1.0, 0.0])).await.unwrap();
        index.upsert(&doc("v2", 0, vec![1.0, 0.0])).await.unwrap();
        index.upsert(&doc("v1", 1, vec![0.0, 1.0])).await.unwrap();

        let hits = index
            .scan(&[1.0, 0.0], &["v1".to_string()], 0.5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].segment.video_id, "v1");
    }

    #[tokio::test]
    async fn test_delete_by_video() {
        let index = MemorySearchIndex::new();
        index.upsert(&doc("v1", 0, vec![1.0])).await.unwrap();
        index.upsert(&doc("v2", 0, vec![1.0])).await.unwrap();

        assert_eq!(index.delete_by_video("v1").await.unwrap(), 1);
        assert_eq!(index.document_count().await.unwrap(), 1);
    }
}
