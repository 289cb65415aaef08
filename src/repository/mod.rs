//! Video, transcript, segment and insight persistence.
//!
//! The pipeline and search engine only touch storage through the
//! [`VideoRepository`] trait. The in-memory implementation backs tests, the
//! SQLite implementation backs the CLI.

mod memory;
mod sqlite;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

use crate::error::{KapitelError, Result};
use crate::insights::Insight;
use crate::transcription::WordTimestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing status of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl VideoStatus {
    /// Whether a transition to `next` is allowed.
    ///
    /// pending -> processing -> {completed, failed}. Completed and failed
    /// are terminal for a run; a new processing run may leave them, but no
    /// transition skips processing.
    pub fn can_transition_to(self, next: VideoStatus) -> bool {
        use VideoStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
                | (Completed, Processing)
        )
    }
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VideoStatus::Pending => "pending",
            VideoStatus::Processing => "processing",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for VideoStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VideoStatus::Pending),
            "processing" => Ok(VideoStatus::Processing),
            "completed" => Ok(VideoStatus::Completed),
            "failed" => Ok(VideoStatus::Failed),
            _ => Err(format!("Unknown video status: {}", s)),
        }
    }
}

/// An uploaded video and its processing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    /// Video ID.
    pub id: String,
    /// Owning user ID.
    pub user_id: String,
    /// Display title.
    pub title: String,
    /// Locator of the source media on disk.
    pub source_path: String,
    /// Duration in seconds, when known.
    pub duration_seconds: Option<f64>,
    /// Current processing status.
    pub status: VideoStatus,
    /// Error message when status is failed.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    /// Create a new pending video record.
    pub fn new(user_id: &str, title: &str, source_path: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            source_path: source_path.to_string(),
            duration_seconds: None,
            status: VideoStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A stored transcript, 1:1 with its video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTranscript {
    pub video_id: String,
    pub full_text: String,
    pub words: Vec<WordTimestamp>,
    pub language: Option<String>,
    pub duration_seconds: f64,
}

/// A persisted chapter of a video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub id: Uuid,
    pub video_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub title: String,
    pub description: String,
    pub text: String,
    pub order_index: i32,
}

/// Minimal reference to a video, used for search scoping.
#[derive(Debug, Clone)]
pub struct VideoRef {
    pub id: String,
    pub title: String,
}

/// Storage interface used by the orchestrator and search engine.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Insert a new video record.
    async fn insert_video(&self, video: &Video) -> Result<()>;

    /// Fetch a video by ID.
    async fn get_video(&self, video_id: &str) -> Result<Option<Video>>;

    /// Transition a video's status, enforcing the state machine. The error
    /// message is recorded for failed transitions and cleared otherwise.
    async fn set_status(
        &self,
        video_id: &str,
        status: VideoStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Record a video's duration once known.
    async fn set_duration(&self, video_id: &str, duration_seconds: f64) -> Result<()>;

    /// Create or overwrite the video's transcript.
    async fn upsert_transcript(&self, transcript: &StoredTranscript) -> Result<()>;

    /// Fetch the transcript for a video.
    async fn get_transcript(&self, video_id: &str) -> Result<Option<StoredTranscript>>;

    /// Replace all segments for a video (and their insights).
    async fn replace_segments(&self, video_id: &str, segments: &[SegmentRecord]) -> Result<()>;

    /// Fetch a video's segments ordered by `order_index`.
    async fn get_segments(&self, video_id: &str) -> Result<Vec<SegmentRecord>>;

    /// Replace the insights for one segment, preserving the given order.
    async fn replace_insights(&self, segment_id: Uuid, insights: &[Insight]) -> Result<()>;

    /// Fetch a segment's insights in order.
    async fn get_insights(&self, segment_id: Uuid) -> Result<Vec<Insight>>;

    /// List a user's completed videos.
    async fn list_completed_videos(&self, user_id: &str) -> Result<Vec<VideoRef>>;
}

/// Validate a status transition, producing a typed error on violation.
pub(crate) fn check_transition(current: VideoStatus, next: VideoStatus) -> Result<()> {
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(KapitelError::InvalidTransition(
            current.to_string(),
            next.to_string(),
        ))
    }
}
