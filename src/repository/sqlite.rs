//! SQLite-backed repository implementation.

use super::{
    check_transition, SegmentRecord, StoredTranscript, Video, VideoRef, VideoRepository,
    VideoStatus,
};
use crate::error::{KapitelError, Result};
use crate::insights::{Insight, InsightType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS videos (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    source_path TEXT NOT NULL,
    duration_seconds REAL,
    status TEXT NOT NULL,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_videos_user_id ON videos(user_id);

CREATE TABLE IF NOT EXISTS transcripts (
    video_id TEXT PRIMARY KEY,
    full_text TEXT NOT NULL,
    words_json TEXT NOT NULL,
    language TEXT,
    duration_seconds REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS segments (
    id TEXT PRIMARY KEY,
    video_id TEXT NOT NULL,
    start_time REAL NOT NULL,
    end_time REAL NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    segment_text TEXT NOT NULL,
    order_index INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_segments_video_id ON segments(video_id);

CREATE TABLE IF NOT EXISTS insights (
    id TEXT PRIMARY KEY,
    segment_id TEXT NOT NULL,
    insight_text TEXT NOT NULL,
    insight_type TEXT NOT NULL,
    order_index INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_insights_segment_id ON insights(segment_id);
"#;

/// SQLite-based video repository.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) a repository at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite repository at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory repository (useful for testing).
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
            .map_err(|e| KapitelError::Repository(format!("Failed to acquire lock: {}", e)))
    }
}

fn row_to_video(row: &rusqlite::Row<'_>) -> rusqlite::Result<Video> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Video {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        source_path: row.get("source_path")?,
        duration_seconds: row.get("duration_seconds")?,
        status: status.parse().unwrap_or(VideoStatus::Pending),
        error_message: row.get("error_message")?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl VideoRepository for SqliteRepository {
    async fn insert_video(&self, video: &Video) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO videos
            (id, user_id, title, source_path, duration_seconds, status, error_message, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                video.id,
                video.user_id,
                video.title,
                video.source_path,
                video.duration_seconds,
                video.status.to_string(),
                video.error_message,
                video.created_at.to_rfc3339(),
                video.updated_at.to_rfc3339(),
            ],
        )?;
        debug!("Inserted video {}", video.id);
        Ok(())
    }

    async fn get_video(&self, video_id: &str) -> Result<Option<Video>> {
        let conn = self.lock()?;
        let video = conn
            .query_row(
                "SELECT * FROM videos WHERE id = ?1",
                params![video_id],
                row_to_video,
            )
            .optional()?;
        Ok(video)
    }

    async fn set_status(
        &self,
        video_id: &str,
        status: VideoStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock()?;

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM videos WHERE id = ?1",
                params![video_id],
                |row| row.get(0),
            )
            .optional()?;

        let current = current
            .ok_or_else(|| KapitelError::VideoNotFound(video_id.to_string()))?
            .parse()
            .unwrap_or(VideoStatus::Pending);

        check_transition(current, status)?;

        conn.execute(
            "UPDATE videos SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                status.to_string(),
                error_message,
                Utc::now().to_rfc3339(),
                video_id
            ],
        )?;
        Ok(())
    }

    async fn set_duration(&self, video_id: &str, duration_seconds: f64) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE videos SET duration_seconds = ?1, updated_at = ?2 WHERE id = ?3",
            params![duration_seconds, Utc::now().to_rfc3339(), video_id],
        )?;
        if updated == 0 {
            return Err(KapitelError::VideoNotFound(video_id.to_string()));
        }
        Ok(())
    }

    async fn upsert_transcript(&self, transcript: &StoredTranscript) -> Result<()> {
        let conn = self.lock()?;
        let words_json = serde_json::to_string(&transcript.words)?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO transcripts
            (video_id, full_text, words_json, language, duration_seconds)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                transcript.video_id,
                transcript.full_text,
                words_json,
                transcript.language,
                transcript.duration_seconds,
            ],
        )?;
        Ok(())
    }

    async fn get_transcript(&self, video_id: &str) -> Result<Option<StoredTranscript>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT full_text, words_json, language, duration_seconds FROM transcripts WHERE video_id = ?1",
                params![video_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, f64>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((full_text, words_json, language, duration_seconds)) => {
                let words = serde_json::from_str(&words_json)?;
                Ok(Some(StoredTranscript {
                    video_id: video_id.to_string(),
                    full_text,
                    words,
                    language,
                    duration_seconds,
                }))
            }
            None => Ok(None),
        }
    }

    async fn replace_segments(&self, video_id: &str, segments: &[SegmentRecord]) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM insights WHERE segment_id IN (SELECT id FROM segments WHERE video_id = ?1)",
            params![video_id],
        )?;
        tx.execute("DELETE FROM segments WHERE video_id = ?1", params![video_id])?;

        for segment in segments {
            tx.execute(
                r#"
                INSERT INTO segments
                (id, video_id, start_time, end_time, title, description, segment_text, order_index)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    segment.id.to_string(),
                    segment.video_id,
                    segment.start_time,
                    segment.end_time,
                    segment.title,
                    segment.description,
                    segment.text,
                    segment.order_index,
                ],
            )?;
        }

        tx.commit()?;
        debug!("Replaced {} segments for video {}", segments.len(), video_id);
        Ok(())
    }

    async fn get_segments(&self, video_id: &str) -> Result<Vec<SegmentRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, video_id, start_time, end_time, title, description, segment_text, order_index
             FROM segments WHERE video_id = ?1 ORDER BY order_index",
        )?;

        let segments = stmt
            .query_map(params![video_id], |row| {
                let id: String = row.get(0)?;
                Ok(SegmentRecord {
                    id: Uuid::parse_str(&id).unwrap_or_default(),
                    video_id: row.get(1)?,
                    start_time: row.get(2)?,
                    end_time: row.get(3)?,
                    title: row.get(4)?,
                    description: row.get(5)?,
                    text: row.get(6)?,
                    order_index: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(segments)
    }

    async fn replace_insights(&self, segment_id: Uuid, insights: &[Insight]) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM insights WHERE segment_id = ?1",
            params![segment_id.to_string()],
        )?;

        for (order, insight) in insights.iter().enumerate() {
            tx.execute(
                "INSERT INTO insights (id, segment_id, insight_text, insight_type, order_index)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    segment_id.to_string(),
                    insight.text,
                    insight.kind.to_string(),
                    order as i32,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn get_insights(&self, segment_id: Uuid) -> Result<Vec<Insight>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT insight_text, insight_type FROM insights WHERE segment_id = ?1 ORDER BY order_index",
        )?;

        let insights = stmt
            .query_map(params![segment_id.to_string()], |row| {
                let text: String = row.get(0)?;
                let kind: String = row.get(1)?;
                Ok((text, kind))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(text, kind)| Insight {
                text,
                kind: kind.parse().unwrap_or(InsightType::MainPoint),
            })
            .collect();

        Ok(insights)
    }

    async fn list_completed_videos(&self, user_id: &str) -> Result<Vec<VideoRef>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title FROM videos WHERE user_id = ?1 AND status = 'completed' ORDER BY created_at",
        )?;

        let refs = stmt
            .query_map(params![user_id], |row| {
                Ok(VideoRef {
                    id: row.get(0)?,
                    title: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::WordTimestamp;

    #[tokio::test]
    async fn test_video_round_trip() {
        let repo = SqliteRepository::in_memory().unwrap();
        let video = Video::new("user1", "My Lecture", "/uploads/lecture.mp4");
        repo.insert_video(&video).await.unwrap();

        let stored = repo.get_video(&video.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "My Lecture");
        assert_eq!(stored.status, VideoStatus::Pending);
    }

    #[tokio::test]
    async fn test_transcript_upsert_overwrites() {
        let repo = SqliteRepository::in_memory().unwrap();

        let mut transcript = StoredTranscript {
            video_id: "v1".to_string(),
            full_text: "first".to_string(),
            words: vec![WordTimestamp {
                word: "first".to_string(),
                start: 0.0,
                end: 0.4,
            }],
            language: Some("en".to_string()),
            duration_seconds: 0.4,
        };
        repo.upsert_transcript(&transcript).await.unwrap();

        transcript.full_text = "second".to_string();
        repo.upsert_transcript(&transcript).await.unwrap();

        let stored = repo.get_transcript("v1").await.unwrap().unwrap();
        assert_eq!(stored.full_text, "second");
        assert_eq!(stored.words.len(), 1);
    }

    #[tokio::test]
    async fn test_segments_and_insights_replace() {
        let repo = SqliteRepository::in_memory().unwrap();
        let segment = SegmentRecord {
            id: Uuid::new_v4(),
            video_id: "v1".to_string(),
            start_time: 0.0,
            end_time: 60.0,
            title: "Intro".to_string(),
            description: "The introduction".to_string(),
            text: "Welcome to the lecture, today we cover many things.".to_string(),
            order_index: 0,
        };

        repo.replace_segments("v1", &[segment.clone()]).await.unwrap();
        repo.replace_insights(
            segment.id,
            &[Insight {
                text: "The lecture covers many things.".to_string(),
                kind: InsightType::MainPoint,
            }],
        )
        .await
        .unwrap();

        // Re-running replaces rather than duplicates
        repo.replace_segments("v1", &[segment.clone()]).await.unwrap();
        assert_eq!(repo.get_segments("v1").await.unwrap().len(), 1);
        assert!(repo.get_insights(segment.id).await.unwrap().is_empty());
    }
}
