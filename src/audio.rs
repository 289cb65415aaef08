//! Audio extraction utilities.
//!
//! Video files are converted to 16 kHz mono WAV with ffmpeg before
//! transcription. Extracted files live in the temp directory and are removed
//! after processing.

use crate::error::{KapitelError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Extracts the audio track of a video as 16 kHz mono PCM WAV.
///
/// If the target file already exists it is reused without re-extracting.
#[instrument(skip(output_dir), fields(video_id = %video_id))]
pub async fn extract_audio(source: &Path, video_id: &str, output_dir: &Path) -> Result<PathBuf> {
    if !source.exists() {
        return Err(KapitelError::AudioExtraction(format!(
            "Source file not found: {}",
            source.display()
        )));
    }

    std::fs::create_dir_all(output_dir)?;
    let target_path = output_dir.join(format!("{}.wav", video_id));

    if target_path.exists() {
        info!("Using cached audio file");
        return Ok(target_path);
    }

    info!("Extracting audio from {}", source.display());

    let result = Command::new("ffmpeg")
        .arg("-i").arg(source)
        .arg("-vn")
        .arg("-acodec").arg("pcm_s16le")
        .arg("-ar").arg("16000")
        .arg("-ac").arg("1")
        .arg("-y")
        .arg("-loglevel").arg("error")
        .arg(&target_path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(KapitelError::ToolNotFound("ffmpeg".into()));
        }
        Err(e) => {
            return Err(KapitelError::AudioExtraction(format!(
                "ffmpeg execution failed: {e}"
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // A half-written WAV must not be reused as a cache hit
        let _ = std::fs::remove_file(&target_path);
        return Err(KapitelError::AudioExtraction(format!(
            "ffmpeg failed: {stderr}"
        )));
    }

    Ok(target_path)
}

/// Queries the duration of a media file using ffprobe with JSON output.
#[instrument(skip_all)]
pub async fn probe_duration(path: &Path) -> Result<f64> {
    let result = Command::new("ffprobe")
        .arg("-v").arg("quiet")
        .arg("-print_format").arg("json")
        .arg("-show_format")
        .arg(path)
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(KapitelError::ToolNotFound("ffprobe".into()));
        }
        Err(e) => {
            return Err(KapitelError::AudioExtraction(format!("ffprobe failed: {e}")));
        }
    };

    if !output.status.success() {
        return Err(KapitelError::AudioExtraction("ffprobe returned error".into()));
    }

    let json_str = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|_| KapitelError::AudioExtraction("Invalid ffprobe output".into()))?;

    parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| KapitelError::AudioExtraction("Could not determine duration".into()))
}

/// Removes an extracted audio file. Failure is logged, never fatal.
pub fn cleanup_audio(path: &Path) {
    if !path.exists() {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed extracted audio {:?}", path),
        Err(e) => warn!("Failed to remove extracted audio {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_audio(
            Path::new("/nonexistent/video.mp4"),
            "v1",
            dir.path(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KapitelError::AudioExtraction(_)));
    }

    #[tokio::test]
    async fn test_existing_target_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("video.mp4");
        std::fs::write(&source, b"not really a video").unwrap();

        let cached = dir.path().join("v1.wav");
        std::fs::write(&cached, b"cached").unwrap();

        // ffmpeg never runs when the target already exists
        let path = extract_audio(&source, "v1", dir.path()).await.unwrap();
        assert_eq!(path, cached);
    }

    #[test]
    fn test_cleanup_missing_file_is_noop() {
        cleanup_audio(Path::new("/nonexistent/audio.wav"));
    }
}
