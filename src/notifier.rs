//! User-facing processing notifications.
//!
//! Each pipeline run emits progress, completion and failure events addressed
//! to the owning user. Delivery is best-effort: a failed notification never
//! fails the run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// A processing event addressed to one user. Each event carries the time it
/// was emitted.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessingEvent {
    Progress {
        video_id: String,
        progress: u8,
        stage: String,
        timestamp: DateTime<Utc>,
    },
    Completed {
        video_id: String,
        timestamp: DateTime<Utc>,
    },
    Failed {
        video_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProcessingEvent {
    /// Progress event stamped with the current time.
    pub fn progress(video_id: &str, progress: u8, stage: &str) -> Self {
        ProcessingEvent::Progress {
            video_id: video_id.to_string(),
            progress,
            stage: stage.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Completion event stamped with the current time.
    pub fn completed(video_id: &str) -> Self {
        ProcessingEvent::Completed {
            video_id: video_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Failure event stamped with the current time.
    pub fn failed(video_id: &str, error: &str) -> Self {
        ProcessingEvent::Failed {
            video_id: video_id.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn video_id(&self) -> &str {
        match self {
            ProcessingEvent::Progress { video_id, .. } => video_id,
            ProcessingEvent::Completed { video_id, .. } => video_id,
            ProcessingEvent::Failed { video_id, .. } => video_id,
        }
    }
}

/// Delivery channel for processing events.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an event to a user. Implementations swallow their own errors.
    async fn notify(&self, user_id: &str, event: ProcessingEvent);
}

/// Notifier that writes events to the log.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: &str, event: ProcessingEvent) {
        match &event {
            ProcessingEvent::Progress {
                video_id,
                progress,
                stage,
                ..
            } => {
                info!(user_id, video_id = %video_id, progress, stage, "processing progress");
            }
            ProcessingEvent::Completed { video_id, .. } => {
                info!(user_id, video_id = %video_id, "processing completed");
            }
            ProcessingEvent::Failed {
                video_id, error, ..
            } => {
                info!(user_id, video_id = %video_id, error, "processing failed");
            }
        }
    }
}

/// Notifier that discards all events.
#[derive(Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _user_id: &str, _event: ProcessingEvent) {}
}
