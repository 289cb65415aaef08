//! Pipeline orchestrator for Kapitel.
//!
//! Coordinates a full processing run: audio extraction, transcription,
//! segmentation, per-segment insights and embeddings, and finalization.
//! Progress lands at fixed percentages per stage so observers can render a
//! stable bar regardless of stage durations.

use crate::audio::{cleanup_audio, extract_audio};
use crate::config::Settings;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{KapitelError, Result};
use crate::generation::{OpenAIGenerator, TextGenerator};
use crate::insights::InsightExtractor;
use crate::notifier::{LogNotifier, Notifier, ProcessingEvent};
use crate::progress::{MonotonicSink, ProgressSink};
use crate::repository::{
    SegmentRecord, SqliteRepository, StoredTranscript, Video, VideoRepository, VideoStatus,
};
use crate::search::{IndexedSegment, SearchIndex, SqliteSearchIndex};
use crate::segmenter::{whole_transcript_chapter, BoundarySegmenter, HeuristicSegmenter, Segmenter};
use crate::transcription::{Transcriber, WhisperTranscriber};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// The main orchestrator for the Kapitel pipeline.
pub struct Orchestrator {
    repository: Arc<dyn VideoRepository>,
    transcriber: Arc<dyn Transcriber>,
    segmenter: Arc<dyn Segmenter>,
    insights: InsightExtractor,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn SearchIndex>,
    notifier: Arc<dyn Notifier>,
    temp_dir: PathBuf,
}

impl Orchestrator {
    /// Create an orchestrator with the default OpenAI-backed components and
    /// SQLite persistence.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let generator: Arc<dyn TextGenerator> = Arc::new(OpenAIGenerator::from_settings(settings));

        let segmenter: Arc<dyn Segmenter> = match settings.segmenter.strategy.as_str() {
            "heuristic" => Arc::new(HeuristicSegmenter::with_config(settings.segmenter_config())),
            _ => Arc::new(BoundarySegmenter::with_config(
                generator.clone(),
                settings.segmenter_config(),
            )),
        };

        Ok(Self::with_components(
            Arc::new(SqliteRepository::new(&settings.sqlite_path())?),
            Arc::new(WhisperTranscriber::from_settings(settings)),
            segmenter,
            InsightExtractor::new(generator),
            Arc::new(OpenAIEmbedder::from_settings(settings)),
            Arc::new(SqliteSearchIndex::new(&settings.index_path())?),
            Arc::new(LogNotifier),
            settings.temp_dir(),
        ))
    }

    /// Create an orchestrator with custom components.
    #[allow(clippy::too_many_arguments)]
    pub fn with_components(
        repository: Arc<dyn VideoRepository>,
        transcriber: Arc<dyn Transcriber>,
        segmenter: Arc<dyn Segmenter>,
        insights: InsightExtractor,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn SearchIndex>,
        notifier: Arc<dyn Notifier>,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            repository,
            transcriber,
            segmenter,
            insights,
            embedder,
            index,
            notifier,
            temp_dir,
        }
    }

    /// Get a reference to the repository.
    pub fn repository(&self) -> Arc<dyn VideoRepository> {
        self.repository.clone()
    }

    /// Get a reference to the search index.
    pub fn index(&self) -> Arc<dyn SearchIndex> {
        self.index.clone()
    }

    /// Get a reference to the embedder.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    /// Process a registered video end to end.
    ///
    /// On success the video is `completed` and progress ends at exactly 100.
    /// On fatal failure the video is `failed` with the error message recorded
    /// and the error propagates to the caller (the job queue retries it).
    /// Extracted audio is removed on both paths.
    #[instrument(skip(self, sink), fields(video_id = %video_id))]
    pub async fn run(&self, video_id: &str, sink: Arc<dyn ProgressSink>) -> Result<()> {
        let video = self
            .repository
            .get_video(video_id)
            .await?
            .ok_or_else(|| KapitelError::VideoNotFound(video_id.to_string()))?;

        self.repository
            .set_status(video_id, VideoStatus::Processing, None)
            .await?;

        let sink = MonotonicSink::new(sink);
        self.report(&video, &sink, 10, "processing").await;

        let mut audio_path: Option<PathBuf> = None;
        let outcome = self.execute(&video, &sink, &mut audio_path).await;

        if let Some(path) = audio_path {
            cleanup_audio(&path);
        }

        match outcome {
            Ok(segment_count) => {
                self.report(&video, &sink, 100, "completed").await;
                self.notifier
                    .notify(&video.user_id, ProcessingEvent::completed(&video.id))
                    .await;
                info!("Processed {} into {} segments", video.id, segment_count);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(se) = self
                    .repository
                    .set_status(video_id, VideoStatus::Failed, Some(&message))
                    .await
                {
                    warn!("Failed to record failure status: {}", se);
                }
                self.notifier
                    .notify(&video.user_id, ProcessingEvent::failed(&video.id, &message))
                    .await;
                Err(e)
            }
        }
    }

    /// The fatal part of the pipeline. Returns the number of segments stored.
    async fn execute(
        &self,
        video: &Video,
        sink: &MonotonicSink<Arc<dyn ProgressSink>>,
        audio_path: &mut Option<PathBuf>,
    ) -> Result<usize> {
        self.report(video, sink, 15, "extracting_audio").await;
        let path = extract_audio(Path::new(&video.source_path), &video.id, &self.temp_dir).await?;
        *audio_path = Some(path.clone());
        self.report(video, sink, 20, "audio_extracted").await;

        self.report(video, sink, 25, "transcribing").await;
        let transcript = self.transcriber.transcribe(&path).await?;
        self.repository
            .upsert_transcript(&StoredTranscript {
                video_id: video.id.clone(),
                full_text: transcript.full_text.clone(),
                words: transcript.words.clone(),
                language: transcript.language.clone(),
                duration_seconds: transcript.duration_seconds,
            })
            .await?;
        self.repository
            .set_duration(&video.id, transcript.duration_seconds)
            .await?;
        self.report(video, sink, 40, "transcription_complete").await;

        self.report(video, sink, 45, "chunking").await;
        let mut chapters = self.segmenter.segment(&transcript).await?;
        if chapters.is_empty() {
            // Always store at least one searchable segment
            chapters = vec![whole_transcript_chapter(&transcript)];
        }

        let segments: Vec<SegmentRecord> = chapters
            .into_iter()
            .enumerate()
            .map(|(i, chapter)| SegmentRecord {
                id: Uuid::new_v4(),
                video_id: video.id.clone(),
                start_time: chapter.start_time,
                end_time: chapter.end_time,
                title: chapter.title,
                description: chapter.description,
                text: chapter.text,
                order_index: i as i32,
            })
            .collect();

        self.repository
            .replace_segments(&video.id, &segments)
            .await?;

        // Reprocessing replaces the old vectors; stale ones must not linger
        if let Err(e) = self.index.delete_by_video(&video.id).await {
            warn!("Failed to clear old index entries: {}", e);
        }
        self.report(video, sink, 60, "chunking_complete").await;

        self.report(video, sink, 65, "extracting_insights").await;
        let total = segments.len();
        for (i, segment) in segments.iter().enumerate() {
            self.process_segment(segment).await;

            let done = i + 1;
            let progress = 65 + (20 * done / total) as u8;
            self.report(
                video,
                sink,
                progress,
                &format!("processing_segment_{}_of_{}", done, total),
            )
            .await;
        }

        self.report(video, sink, 95, "finalizing").await;
        self.repository
            .set_status(&video.id, VideoStatus::Completed, None)
            .await?;

        Ok(total)
    }

    /// Extract insights and index one segment. Each step is best-effort: a
    /// failure degrades that segment, never the run.
    async fn process_segment(&self, segment: &SegmentRecord) {
        match self.insights.extract(&segment.text).await {
            Ok(insights) => {
                if let Err(e) = self.repository.replace_insights(segment.id, &insights).await {
                    warn!("Failed to store insights for segment {}: {}", segment.id, e);
                }
            }
            Err(e) => {
                warn!("Insight extraction failed for segment {}: {}", segment.id, e);
            }
        }

        match self.embedder.embed(&segment.text).await {
            Ok(embedding) => {
                let doc = IndexedSegment {
                    segment_id: segment.id,
                    video_id: segment.video_id.clone(),
                    segment_title: segment.title.clone(),
                    segment_text: segment.text.clone(),
                    start_time: segment.start_time,
                    order_index: segment.order_index,
                    embedding,
                    model_id: self.embedder.model_id().to_string(),
                    indexed_at: Utc::now(),
                };
                if let Err(e) = self.index.upsert(&doc).await {
                    warn!("Failed to index segment {}: {}", segment.id, e);
                }
            }
            Err(e) => {
                warn!("Embedding failed for segment {}: {}", segment.id, e);
            }
        }
    }

    async fn report(
        &self,
        video: &Video,
        sink: &MonotonicSink<Arc<dyn ProgressSink>>,
        progress: u8,
        stage: &str,
    ) {
        sink.report(progress, stage);
        self.notifier
            .notify(
                &video.user_id,
                ProcessingEvent::progress(&video.id, progress, stage),
            )
            .await;
    }
}
