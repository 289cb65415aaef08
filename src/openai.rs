//! Shared OpenAI client construction.

use crate::config::Settings;
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Request timeout applied when no configuration is available.
const FALLBACK_TIMEOUT_SECS: u64 = 300;

/// Build a client whose request timeout comes from the configuration.
///
/// Transcription uploads whole audio files, so the timeout has to cover the
/// upload as well as the model's response.
pub fn client_from_settings(settings: &Settings) -> Client<OpenAIConfig> {
    client_with_timeout(settings.request_timeout())
}

/// Build a client with the fallback timeout.
pub fn default_client() -> Client<OpenAIConfig> {
    client_with_timeout(Duration::from_secs(FALLBACK_TIMEOUT_SECS))
}

/// Build a client with an explicit request timeout.
pub fn client_with_timeout(timeout: Duration) -> Client<OpenAIConfig> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client");

    Client::with_config(OpenAIConfig::default()).with_http_client(http_client)
}
