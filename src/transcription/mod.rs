//! Speech-to-text transcription.
//!
//! Provides a trait-based interface so the pipeline can be exercised with
//! fakes in tests while production uses OpenAI Whisper.

mod whisper;

pub use whisper::WhisperTranscriber;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single word with timing information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTimestamp {
    /// The word text.
    pub word: String,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
}

/// A complete transcript with word-level timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptData {
    /// Full transcript text.
    pub full_text: String,
    /// All words with timestamps. May be empty if the provider could not
    /// produce word-level timing.
    pub words: Vec<WordTimestamp>,
    /// Detected language (if available).
    pub language: Option<String>,
    /// Total duration in seconds.
    pub duration_seconds: f64,
}

impl TranscriptData {
    /// Create a transcript from words, deriving full text and duration.
    pub fn from_words(words: Vec<WordTimestamp>, language: Option<String>) -> Self {
        let full_text = words
            .iter()
            .map(|w| w.word.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let duration_seconds = words.last().map(|w| w.end).unwrap_or(0.0);

        Self {
            full_text,
            words,
            language,
            duration_seconds,
        }
    }

    /// Create a transcript from plain text without word timing.
    pub fn from_text(text: String, language: Option<String>, duration_seconds: f64) -> Self {
        Self {
            full_text: text,
            words: Vec::new(),
            language,
            duration_seconds,
        }
    }

    /// Number of words in the transcript text.
    pub fn word_count(&self) -> usize {
        self.full_text.split_whitespace().count()
    }
}

/// Trait for transcription implementations.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio file into text with word-level timestamps.
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptData>;
}
