//! Typed insight extraction from chapter text.
//!
//! Insights are best-effort: the pipeline never fails because of them, and
//! any non-empty chapter is guaranteed at least one `main_point` insight even
//! when the generation capability is unavailable.

use crate::error::Result;
use crate::generation::{extract_json, TextGenerator};
use crate::segmenter::truncate_text;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum number of insights kept per chapter.
const MAX_INSIGHTS: usize = 10;
/// Candidates outside this length band (exclusive) are discarded as noise.
const MIN_TEXT_LEN: usize = 10;
const MAX_TEXT_LEN: usize = 500;

const INSIGHT_SYSTEM_PROMPT: &str = "You are a helpful assistant that extracts key insights from video transcripts.\n\
Extract the following types of insights:\n\
- main_point: The 2-4 most important ideas or arguments\n\
- definition: Important terms, concepts, or principles explicitly defined\n\
- example: Case studies, illustrations, or demonstrations\n\
- takeaway: Practical advice, steps, or recommendations\n\
- qa: Questions raised and answered\n\n\
Return ONLY a JSON object of the form {\"insights\": [{\"text\": \"...\", \"type\": \"...\"}]}. Limit to 5-10 insights total.";

/// The category of an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    MainPoint,
    Definition,
    Example,
    Takeaway,
    Qa,
}

impl FromStr for InsightType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "main_point" => Ok(InsightType::MainPoint),
            "definition" => Ok(InsightType::Definition),
            "example" => Ok(InsightType::Example),
            "takeaway" => Ok(InsightType::Takeaway),
            "qa" => Ok(InsightType::Qa),
            _ => Err(format!("Unknown insight type: {}", s)),
        }
    }
}

impl std::fmt::Display for InsightType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InsightType::MainPoint => "main_point",
            InsightType::Definition => "definition",
            InsightType::Example => "example",
            InsightType::Takeaway => "takeaway",
            InsightType::Qa => "qa",
        };
        write!(f, "{}", s)
    }
}

/// A short typed statement derived from a chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub text: String,
    pub kind: InsightType,
}

/// Expected shape of the insight-extraction reply.
#[derive(Debug, Deserialize)]
struct InsightPayload {
    insights: Vec<RawInsight>,
}

#[derive(Debug, Deserialize)]
struct RawInsight {
    text: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// LLM-backed insight extractor.
pub struct InsightExtractor {
    generator: Arc<dyn TextGenerator>,
}

impl InsightExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Extract an ordered list of typed insights from chapter text.
    ///
    /// Always yields at least one `main_point` for non-empty input: when the
    /// capability fails or every candidate is rejected, the chapter's first
    /// sentence is synthesized as the guaranteed fallback.
    pub async fn extract(&self, chapter_text: &str) -> Result<Vec<Insight>> {
        let chapter_text = chapter_text.trim();
        if chapter_text.is_empty() {
            return Ok(Vec::new());
        }

        let mut insights = match self.generate(chapter_text).await {
            Ok(candidates) => validate(candidates),
            Err(e) => {
                warn!("Insight generation failed: {}", e);
                Vec::new()
            }
        };

        if !insights.iter().any(|i| i.kind == InsightType::MainPoint) {
            insights.insert(
                0,
                Insight {
                    text: first_sentence(chapter_text),
                    kind: InsightType::MainPoint,
                },
            );
            insights.truncate(MAX_INSIGHTS);
        }

        debug!("Extracted {} insights", insights.len());
        Ok(insights)
    }

    async fn generate(&self, text: &str) -> Result<Vec<RawInsight>> {
        let user = format!(
            "Extract insights from this transcript segment:\n\n{}",
            truncate_text(text, 2000)
        );

        let response = self.generator.complete(INSIGHT_SYSTEM_PROMPT, &user).await?;
        let payload: InsightPayload = serde_json::from_str(extract_json(&response))?;
        Ok(payload.insights)
    }
}

/// Validate and normalize raw candidates.
fn validate(candidates: Vec<RawInsight>) -> Vec<Insight> {
    candidates
        .into_iter()
        .filter_map(|raw| {
            let text = raw.text.trim().to_string();
            if text.len() <= MIN_TEXT_LEN || text.len() >= MAX_TEXT_LEN {
                return None;
            }

            // Unrecognized types are coerced rather than dropped
            let kind = raw
                .kind
                .as_deref()
                .and_then(|k| k.parse().ok())
                .unwrap_or(InsightType::MainPoint);

            Some(Insight { text, kind })
        })
        .take(MAX_INSIGHTS)
        .collect()
}

/// First sentence of a text, used as the guaranteed fallback insight.
fn first_sentence(text: &str) -> String {
    let end = text
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or_else(|| truncate_text(text, 200).len());

    text[..end].trim().to_string()
}
