//! Process command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressSink;
use crate::queue::{JobQueue, JobState, QueueConfig};
use crate::repository::Video;
use anyhow::Result;
use indicatif::ProgressBar;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Progress sink that drives the terminal bar.
struct BarSink {
    bar: ProgressBar,
}

impl ProgressSink for BarSink {
    fn report(&self, progress: u8, stage: &str) {
        self.bar.set_position(progress as u64);
        self.bar.set_message(stage.replace('_', " "));
    }
}

/// Run the process command: register a video, enqueue it and wait for the
/// pipeline to finish.
pub async fn run_process(
    file: &str,
    title: Option<String>,
    user: &str,
    settings: Settings,
) -> Result<()> {
    let path = Path::new(file);
    if !path.exists() {
        Output::error(&format!("File not found: {}", file));
        anyhow::bail!("File not found: {}", file);
    }

    let title = title.unwrap_or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled")
            .to_string()
    });

    let source_path = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string();

    let orchestrator = Arc::new(Orchestrator::from_settings(&settings)?);
    let repository = orchestrator.repository();

    let video = Video::new(user, &title, &source_path);
    let video_id = video.id.clone();
    repository.insert_video(&video).await?;

    Output::info(&format!("Registered video {} ({})", title, video_id));

    let queue = JobQueue::new(QueueConfig {
        workers: settings.queue.workers,
        max_attempts: settings.queue.max_attempts,
        backoff: Duration::from_secs(settings.queue.backoff_seconds),
        stall_after: Duration::from_secs(settings.queue.stall_seconds),
        ..QueueConfig::default()
    });

    let bar = Output::pipeline_bar();
    queue.process(orchestrator, Arc::new(BarSink { bar: bar.clone() }));
    let handle = queue.enqueue(&video_id)?;

    // Wait for the job to reach a terminal state
    let status = loop {
        match queue.status_by_id(handle.id) {
            Some(status) if status.state.is_terminal() => break status,
            Some(_) => tokio::time::sleep(Duration::from_millis(200)).await,
            None => anyhow::bail!("Job disappeared from the queue"),
        }
    };
    bar.finish_and_clear();
    queue.shutdown().await;

    match status.state {
        JobState::Completed => {
            let segments = repository.get_segments(&video_id).await?;
            Output::success(&format!(
                "Processed into {} chapters (after {} attempt{})",
                segments.len(),
                status.attempts,
                if status.attempts == 1 { "" } else { "s" }
            ));
            Output::kv("video id", &video_id);
            Ok(())
        }
        _ => {
            let message = status.error.unwrap_or_else(|| "unknown error".to_string());
            Output::error(&format!(
                "Processing failed after {} attempts: {}",
                status.attempts, message
            ));
            anyhow::bail!("Processing failed: {}", message)
        }
    }
}
