//! Error types for Kapitel.

use thiserror::Error;

/// Library-level error type for Kapitel operations.
#[derive(Error, Debug)]
pub enum KapitelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Audio extraction failed: {0}")]
    AudioExtraction(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    #[error("Insight extraction failed: {0}")]
    Insights(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Text generation failed: {0}")]
    Generation(String),

    #[error("Search index error: {0}")]
    SearchIndex(String),

    #[error("Search failed")]
    SearchFailed,

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Invalid status transition: {0} -> {1}")]
    InvalidTransition(String, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Kapitel operations.
pub type Result<T> = std::result::Result<T, KapitelError>;
