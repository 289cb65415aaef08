//! Text-generation capability used for boundary detection, chapter titles,
//! insight extraction and query expansion.
//!
//! Components consume a narrow [`TextGenerator`] trait so tests can substitute
//! deterministic fakes. Structured output is validated against strict schemas
//! at each call site; a schema mismatch triggers the caller's fallback rather
//! than probing alternative field names.

mod openai;

pub use openai::OpenAIGenerator;

use crate::error::Result;
use async_trait::async_trait;

/// Trait for chat-completion style text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run a single system + user prompt exchange, returning the raw reply.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Extract a JSON payload from an LLM reply.
///
/// Models frequently wrap JSON in prose or markdown fences; this finds the
/// outermost object or array so the caller can parse it strictly.
pub fn extract_json(response: &str) -> &str {
    let object = response.find('{').zip(response.rfind('}'));
    let array = response.find('[').zip(response.rfind(']'));

    let span = match (object, array) {
        (Some((os, oe)), Some((as_, ae))) if as_ < os && ae > os => Some((as_, ae)),
        (Some(span), _) => Some(span),
        (None, Some(span)) => Some(span),
        (None, None) => None,
    };

    match span {
        Some((start, end)) if end > start => &response[start..=end],
        _ => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object() {
        let response = "Here you go:\n```json\n{\"title\": \"Intro\"}\n```";
        assert_eq!(extract_json(response), "{\"title\": \"Intro\"}");
    }

    #[test]
    fn test_extract_json_array() {
        let response = "[{\"a\": 1}, {\"a\": 2}] and some trailing prose";
        assert_eq!(extract_json(response), "[{\"a\": 1}, {\"a\": 2}]");
    }

    #[test]
    fn test_extract_json_array_wrapping_objects() {
        let response = "result: [{\"x\": 1}]";
        assert_eq!(extract_json(response), "[{\"x\": 1}]");
    }

    #[test]
    fn test_extract_json_no_json() {
        assert_eq!(extract_json("plain text"), "plain text");
    }
}
