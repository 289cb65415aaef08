//! SQLite-based search index implementation.
//!
//! Embeddings are stored as little-endian f32 blobs and cosine similarity is
//! computed in Rust. For large libraries, consider the sqlite-vec extension
//! or a dedicated vector database.

use super::{cosine_similarity, IndexedSegment, ScoredSegment, SearchIndex};
use crate::error::{KapitelError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS embeddings (
    segment_id TEXT PRIMARY KEY,
    video_id TEXT NOT NULL,
    segment_title TEXT NOT NULL,
    segment_text TEXT NOT NULL,
    start_time REAL NOT NULL,
    order_index INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    model_id TEXT NOT NULL,
    indexed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_embeddings_video_id ON embeddings(video_id);
"#;

/// SQLite-backed embedding index.
pub struct SqliteSearchIndex {
    conn: Mutex<Connection>,
}

impl SqliteSearchIndex {
    /// Open (or create) an index at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite search index at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory index (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| KapitelError::SearchIndex(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }
}

#[async_trait]
impl SearchIndex for SqliteSearchIndex {
    async fn upsert(&self, doc: &IndexedSegment) -> Result<()> {
        let conn = self.lock()?;
        let embedding_bytes = Self::embedding_to_bytes(&doc.embedding);

        conn.execute(
            r#"
            INSERT OR REPLACE INTO embeddings
            (segment_id, video_id, segment_title, segment_text, start_time,
             order_index, embedding, model_id, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                doc.segment_id.to_string(),
                doc.video_id,
                doc.segment_title,
                doc.segment_text,
                doc.start_time,
                doc.order_index,
                embedding_bytes,
                doc.model_id,
                doc.indexed_at.to_rfc3339(),
            ],
        )?;

        debug!("Upserted embedding for segment {}", doc.segment_id);
        Ok(())
    }

    async fn delete_by_video(&self, video_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM embeddings WHERE video_id = ?1",
            params![video_id],
        )?;
        Ok(deleted)
    }

    async fn scan(
        &self,
        query_embedding: &[f32],
        video_ids: &[String],
        min_similarity: f32,
    ) -> Result<Vec<ScoredSegment>> {
        if video_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;

        let placeholders = (1..=video_ids.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT segment_id, video_id, segment_title, segment_text, start_time,
                    order_index, embedding, model_id, indexed_at
             FROM embeddings WHERE video_id IN ({}) ORDER BY video_id, order_index",
            placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(video_ids.iter()), |row| {
                let segment_id: String = row.get(0)?;
                let embedding: Vec<u8> = row.get(6)?;
                let indexed_at: String = row.get(8)?;
                Ok(IndexedSegment {
                    segment_id: Uuid::parse_str(&segment_id).unwrap_or_default(),
                    video_id: row.get(1)?,
                    segment_title: row.get(2)?,
                    segment_text: row.get(3)?,
                    start_time: row.get(4)?,
                    order_index: row.get(5)?,
                    embedding: Self::bytes_to_embedding(&embedding),
                    model_id: row.get(7)?,
                    indexed_at: DateTime::parse_from_rfc3339(&indexed_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let results = rows
            .into_iter()
            .map(|segment| ScoredSegment {
                similarity: cosine_similarity(query_embedding, &segment.embedding),
                segment,
            })
            .filter(|r| r.similarity > min_similarity)
            .collect();

        Ok(results)
    }

    async fn document_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(video_id: &str, order_index: i32, embedding: Vec<f32>) -> IndexedSegment {
        IndexedSegment {
            segment_id: Uuid::new_v4(),
            video_id: video_id.to_string(),
            segment_title: "Chapter".to_string(),
            segment_text: "Some text".to_string(),
            start_time: 0.0,
            order_index,
            embedding,
            model_id: "test-model".to_string(),
            indexed_at: Utc::now(),
        }
    }

    #[test]
    fn test_embedding_byte_round_trip() {
        let embedding = vec![0.5, -1.25, 3.0];
        let bytes = SqliteSearchIndex::embedding_to_bytes(&embedding);
        assert_eq!(SqliteSearchIndex::bytes_to_embedding(&bytes), embedding);
    }

    #[tokio::test]
    async fn test_upsert_and_scan() {
        let index = SqliteSearchIndex::in_memory().unwrap();
        index.upsert(&doc("v1", 0, vec![1.0, 0.0])).await.unwrap();
        index.upsert(&doc("v1", 1, vec![0.0, 1.0])).await.unwrap();

        let hits = index
            .scan(&[1.0, 0.0], &["v1".to_string()], 0.5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].similarity - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_segment() {
        let index = SqliteSearchIndex::in_memory().unwrap();
        let d = doc("v1", 0, vec![1.0, 0.0]);
        index.upsert(&d).await.unwrap();
        index.upsert(&d).await.unwrap();
        assert_eq!(index.document_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scan_empty_scope() {
        let index = SqliteSearchIndex::in_memory().unwrap();
        let hits = index.scan(&[1.0], &[], 0.0).await.unwrap();
        assert!(hits.is_empty());
    }
}
