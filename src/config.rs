//! Configuration settings for Kapitel.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub transcription: TranscriptionSettings,
    pub generation: GenerationSettings,
    pub embedding: EmbeddingSettings,
    pub segmenter: SegmenterSettings,
    pub search: SearchSettings,
    pub queue: QueueSettings,
    pub storage: StorageSettings,
}


/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Directory for temporary files (extracted audio).
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Timeout in seconds for OpenAI API requests.
    pub request_timeout_seconds: u64,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.kapitel".to_string(),
            temp_dir: "/tmp/kapitel".to_string(),
            log_level: "info".to_string(),
            request_timeout_seconds: 300,
        }
    }
}

/// Transcription service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Whisper model to use.
    pub model: String,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
        }
    }
}

/// Chat-completion settings for segmentation, insights and query expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Model for boundary detection, chapter info and insight extraction.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Transcript segmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterSettings {
    /// Segmentation strategy (boundary, heuristic).
    pub strategy: String,
    /// Size of LLM analysis windows in characters.
    pub window_chars: usize,
    /// Stride length for the heuristic strategy.
    pub stride_chars: usize,
    /// Minimum character spacing between chapter boundaries.
    pub min_spacing_chars: usize,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            strategy: "boundary".to_string(),
            window_chars: 8000,
            stride_chars: 2000,
            min_spacing_chars: 200,
        }
    }
}

/// Search defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Default result limit.
    pub default_limit: usize,
    /// Default minimum similarity threshold.
    pub min_similarity: f32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: 20,
            min_similarity: 0.5,
        }
    }
}

/// Job queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Maximum processing attempts per job.
    pub max_attempts: u32,
    /// Initial retry backoff in seconds (doubles per attempt).
    pub backoff_seconds: u64,
    /// Seconds without progress before a job is flagged as stalled.
    pub stall_seconds: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            max_attempts: 3,
            backoff_seconds: 2,
            stall_seconds: 300,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path to the SQLite database holding videos, transcripts and segments.
    pub sqlite_path: String,
    /// Path to the SQLite embedding index.
    pub index_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.kapitel/kapitel.db".to_string(),
            index_path: "~/.kapitel/index.db".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::KapitelError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kapitel")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Get the expanded repository database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.sqlite_path)
    }

    /// Get the expanded embedding index path.
    pub fn index_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.index_path)
    }

    /// Get the API request timeout.
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.general.request_timeout_seconds)
    }

    /// Build the segmenter configuration from settings.
    pub fn segmenter_config(&self) -> crate::segmenter::SegmenterConfig {
        crate::segmenter::SegmenterConfig {
            window_chars: self.segmenter.window_chars,
            stride_chars: self.segmenter.stride_chars,
            min_spacing_chars: self.segmenter.min_spacing_chars,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse_from_empty_toml() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.embedding.dimensions, 1536);
        assert_eq!(settings.queue.max_attempts, 3);
        assert_eq!(settings.search.default_limit, 20);
    }

    #[test]
    fn test_partial_override() {
        let settings: Settings = toml::from_str(
            r#"
            [queue]
            workers = 4

            [segmenter]
            strategy = "heuristic"
            "#,
        )
        .unwrap();
        assert_eq!(settings.queue.workers, 4);
        assert_eq!(settings.segmenter.strategy, "heuristic");
        // Untouched sections keep their defaults
        assert_eq!(settings.queue.max_attempts, 3);
        assert_eq!(settings.segmenter.window_chars, 8000);
    }

    #[test]
    fn test_request_timeout_override() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.request_timeout().as_secs(), 300);

        let settings: Settings = toml::from_str(
            r#"
            [general]
            request_timeout_seconds = 60
            "#,
        )
        .unwrap();
        assert_eq!(settings.request_timeout().as_secs(), 60);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.queue.workers = 8;
        settings.save_to(&path).unwrap();

        let reloaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(reloaded.queue.workers, 8);
    }
}
