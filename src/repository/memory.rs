//! In-memory repository implementation.
//!
//! Useful for testing and single-run processing.

use super::{
    check_transition, SegmentRecord, StoredTranscript, Video, VideoRef, VideoRepository,
    VideoStatus,
};
use crate::error::{KapitelError, Result};
use crate::insights::Insight;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    videos: HashMap<String, Video>,
    transcripts: HashMap<String, StoredTranscript>,
    segments: HashMap<String, Vec<SegmentRecord>>,
    insights: HashMap<Uuid, Vec<Insight>>,
}

/// In-memory video repository.
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<Inner>,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoRepository for MemoryRepository {
    async fn insert_video(&self, video: &Video) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.videos.insert(video.id.clone(), video.clone());
        Ok(())
    }

    async fn get_video(&self, video_id: &str) -> Result<Option<Video>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.videos.get(video_id).cloned())
    }

    async fn set_status(
        &self,
        video_id: &str,
        status: VideoStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let video = inner
            .videos
            .get_mut(video_id)
            .ok_or_else(|| KapitelError::VideoNotFound(video_id.to_string()))?;

        check_transition(video.status, status)?;

        video.status = status;
        video.error_message = error_message.map(|e| e.to_string());
        video.updated_at = Utc::now();
        Ok(())
    }

    async fn set_duration(&self, video_id: &str, duration_seconds: f64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let video = inner
            .videos
            .get_mut(video_id)
            .ok_or_else(|| KapitelError::VideoNotFound(video_id.to_string()))?;
        video.duration_seconds = Some(duration_seconds);
        video.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_transcript(&self, transcript: &StoredTranscript) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .transcripts
            .insert(transcript.video_id.clone(), transcript.clone());
        Ok(())
    }

    async fn get_transcript(&self, video_id: &str) -> Result<Option<StoredTranscript>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.transcripts.get(video_id).cloned())
    }

    async fn replace_segments(&self, video_id: &str, segments: &[SegmentRecord]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        // Cascade: insights of the previous segments go with them
        if let Some(old) = inner.segments.remove(video_id) {
            for segment in old {
                inner.insights.remove(&segment.id);
            }
        }

        let mut ordered = segments.to_vec();
        ordered.sort_by_key(|s| s.order_index);
        inner.segments.insert(video_id.to_string(), ordered);
        Ok(())
    }

    async fn get_segments(&self, video_id: &str) -> Result<Vec<SegmentRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.segments.get(video_id).cloned().unwrap_or_default())
    }

    async fn replace_insights(&self, segment_id: Uuid, insights: &[Insight]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.insights.insert(segment_id, insights.to_vec());
        Ok(())
    }

    async fn get_insights(&self, segment_id: Uuid) -> Result<Vec<Insight>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.insights.get(&segment_id).cloned().unwrap_or_default())
    }

    async fn list_completed_videos(&self, user_id: &str) -> Result<Vec<VideoRef>> {
        let inner = self.inner.read().unwrap();
        let mut refs: Vec<VideoRef> = inner
            .videos
            .values()
            .filter(|v| v.user_id == user_id && v.status == VideoStatus::Completed)
            .map(|v| VideoRef {
                id: v.id.clone(),
                title: v.title.clone(),
            })
            .collect();
        refs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(refs)
    }
}
