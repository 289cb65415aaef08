//! OpenAI Whisper transcription implementation.

use super::{Transcriber, TranscriptData, WordTimestamp};
use crate::config::Settings;
use crate::error::{KapitelError, Result};
use crate::openai::{client_from_settings, default_client};
use async_openai::types::{AudioResponseFormat, CreateTranscriptionRequestArgs, TimestampGranularity};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, instrument, warn};

/// OpenAI Whisper-based transcriber with word-level timestamps.
pub struct WhisperTranscriber {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl WhisperTranscriber {
    /// Create a new Whisper transcriber with the default model.
    pub fn new() -> Self {
        Self::with_model("whisper-1")
    }

    /// Create a new Whisper transcriber with a custom model.
    pub fn with_model(model: &str) -> Self {
        Self {
            client: default_client(),
            model: model.to_string(),
        }
    }

    /// Create a transcriber from configuration, honoring the request timeout.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            client: client_from_settings(settings),
            model: settings.transcription.model.clone(),
        }
    }
}

impl Default for WhisperTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptData> {
        debug!("Transcribing audio file with word-level timestamps");

        let file_bytes = tokio::fs::read(audio_path).await?;

        let request = CreateTranscriptionRequestArgs::default()
            .file(async_openai::types::AudioInput::from_vec_u8(
                audio_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("audio.wav")
                    .to_string(),
                file_bytes,
            ))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson)
            .timestamp_granularities(vec![TimestampGranularity::Word])
            .build()
            .map_err(|e| KapitelError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| KapitelError::OpenAI(format!("Whisper API error: {}", e)))?;

        let words: Vec<WordTimestamp> = response
            .words
            .as_ref()
            .map(|ws| {
                ws.iter()
                    .map(|w| WordTimestamp {
                        word: w.word.clone(),
                        start: w.start as f64,
                        end: w.end as f64,
                    })
                    .collect()
            })
            .unwrap_or_else(|| {
                warn!("No word-level timestamps returned, approximating from segments");
                // Fallback: spread segment timing evenly across its words
                response
                    .segments
                    .as_ref()
                    .map(|segs| {
                        segs.iter()
                            .flat_map(|s| {
                                let words: Vec<&str> = s.text.split_whitespace().collect();
                                if words.is_empty() {
                                    return vec![];
                                }
                                let duration = (s.end - s.start) as f64;
                                let word_duration = duration / words.len() as f64;
                                words
                                    .into_iter()
                                    .enumerate()
                                    .map(|(i, word)| WordTimestamp {
                                        word: word.to_string(),
                                        start: s.start as f64 + i as f64 * word_duration,
                                        end: s.start as f64 + (i + 1) as f64 * word_duration,
                                    })
                                    .collect::<Vec<_>>()
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            });

        debug!("Transcribed {} words", words.len());

        let duration = response.duration as f64;
        let language = Some(response.language.clone()).filter(|l| !l.is_empty());

        Ok(TranscriptData {
            full_text: response.text.trim().to_string(),
            words,
            language,
            duration_seconds: duration,
        })
    }
}

/// Check if the OpenAI API key is configured.
pub fn is_api_key_configured() -> bool {
    std::env::var("OPENAI_API_KEY").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_check() {
        // This just tests that the function works
        let _ = is_api_key_configured();
    }
}
