//! Status command implementation.

use crate::cli::{format_timestamp, Output};
use crate::config::Settings;
use crate::repository::{SqliteRepository, VideoRepository, VideoStatus};
use anyhow::Result;

/// Run the status command.
pub async fn run_status(video_id: &str, settings: Settings) -> Result<()> {
    let repository = SqliteRepository::new(&settings.sqlite_path())?;

    let Some(video) = repository.get_video(video_id).await? else {
        Output::error(&format!("No video with ID {}", video_id));
        anyhow::bail!("Video not found: {}", video_id);
    };

    Output::header(&video.title);
    Output::kv("id", &video.id);
    Output::kv("status", &video.status.to_string());
    if let Some(duration) = video.duration_seconds {
        Output::kv("duration", &format_timestamp(duration));
    }
    if let Some(error) = &video.error_message {
        Output::kv("error", error);
    }

    if video.status == VideoStatus::Processing {
        // Job progress and stage live in the process that enqueued the job;
        // this command only sees the persisted record.
        Output::info("Processing in progress; the process command shows live progress and stage.");
    }

    if video.status == VideoStatus::Completed {
        let segments = repository.get_segments(&video.id).await?;
        Output::kv("chapters", &segments.len().to_string());
        for segment in &segments {
            println!(
                "  {}. [{}] {}",
                segment.order_index + 1,
                format_timestamp(segment.start_time),
                segment.title
            );
        }
    }

    Ok(())
}
