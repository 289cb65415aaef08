//! Transcript segmentation into topical chapters.
//!
//! Two interchangeable strategies share one contract: LLM boundary detection
//! and a deterministic stride-based heuristic. Both produce ordered,
//! non-overlapping chapters whose character spans cover the transcript.

mod boundary;
mod heuristic;

pub use boundary::BoundarySegmenter;
pub use heuristic::HeuristicSegmenter;

use crate::error::Result;
use crate::transcription::TranscriptData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Estimated speaking rate fallback: ~150 words/minute.
pub const SECONDS_PER_WORD: f64 = 0.4;

/// A topical chapter derived from a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Start time in seconds.
    pub start_time: f64,
    /// End time in seconds.
    pub end_time: f64,
    /// Short chapter title.
    pub title: String,
    /// One-sentence description.
    pub description: String,
    /// Full chapter text.
    pub text: String,
}

/// A detected topic boundary, as an absolute character offset into the
/// transcript text.
#[derive(Debug, Clone)]
pub struct TopicBoundary {
    pub offset: usize,
    pub topic: String,
}

/// Configuration for segmentation.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Size of LLM analysis windows in characters.
    pub window_chars: usize,
    /// Stride length for the heuristic strategy.
    pub stride_chars: usize,
    /// Minimum spacing between kept boundaries.
    pub min_spacing_chars: usize,
    /// How far around a stride point to search for a sentence end.
    pub snap_radius_chars: usize,
    /// Chapters with less text than this are dropped.
    pub min_chapter_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            window_chars: 8000,
            stride_chars: 2000,
            min_spacing_chars: 200,
            snap_radius_chars: 200,
            min_chapter_chars: 50,
        }
    }
}

/// Trait for segmentation implementations.
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Split a transcript into ordered topical chapters.
    async fn segment(&self, transcript: &TranscriptData) -> Result<Vec<Chapter>>;
}

/// Map a character offset in the transcript text to a timestamp.
///
/// Locates the word whose cumulative character span contains the offset and
/// returns its start time. Without word timing, estimates from word count at
/// a fixed reading rate.
pub fn time_for_offset(transcript: &TranscriptData, offset: usize) -> f64 {
    let text = &transcript.full_text;
    let offset = offset.min(text.len());

    if transcript.words.is_empty() {
        let words_before = text[..floor_char_boundary(text, offset)]
            .split_whitespace()
            .count();
        return words_before as f64 * SECONDS_PER_WORD;
    }

    // Words are joined by single spaces in full_text, so a running
    // length + 1 walk recovers each word's span.
    let mut char_count = 0usize;
    for word in &transcript.words {
        let word_len = word.word.len();
        if char_count + word_len >= offset {
            return word.start;
        }
        char_count += word_len + 1;
    }

    transcript.words.last().map(|w| w.start).unwrap_or(0.0)
}

/// Round an offset down to the nearest char boundary.
pub(crate) fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Truncate a string to at most `max_chars` bytes on a char boundary.
pub(crate) fn truncate_text(text: &str, max_chars: usize) -> &str {
    &text[..floor_char_boundary(text, max_chars)]
}

/// Derive a deterministic chapter title from its opening words. The ellipsis
/// only appears when words were actually dropped.
pub(crate) fn fallback_title(text: &str) -> String {
    let mut words = text.split_whitespace();
    let head: Vec<&str> = words.by_ref().take(5).collect();
    if words.next().is_some() {
        format!("{}...", head.join(" "))
    } else {
        head.join(" ")
    }
}

/// Derive a deterministic one-line description of at most 150 characters.
pub(crate) fn fallback_description(text: &str) -> String {
    if text.len() <= 150 {
        return text.trim_end().to_string();
    }
    format!("{}...", truncate_text(text, 147).trim_end())
}

/// Convert boundaries into (start, end, topic) character spans covering the
/// whole text. Assumes boundaries are sorted and seeded with offset 0.
pub(crate) fn spans_from_boundaries(
    text: &str,
    boundaries: &[TopicBoundary],
) -> Vec<(usize, usize, String)> {
    let mut spans = Vec::with_capacity(boundaries.len());

    for (i, boundary) in boundaries.iter().enumerate() {
        let start = floor_char_boundary(text, boundary.offset);
        let end = boundaries
            .get(i + 1)
            .map(|b| floor_char_boundary(text, b.offset))
            .unwrap_or(text.len());

        if end > start {
            spans.push((start, end, boundary.topic.clone()));
        }
    }

    spans
}

/// Build a single chapter spanning the whole transcript.
///
/// Used when segmentation produces no usable chapters at all.
pub fn whole_transcript_chapter(transcript: &TranscriptData) -> Chapter {
    let text = transcript.full_text.trim().to_string();
    Chapter {
        start_time: 0.0,
        end_time: transcript.duration_seconds,
        title: fallback_title(&text),
        description: fallback_description(&text),
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::WordTimestamp;

    fn transcript_with_words() -> TranscriptData {
        let words = vec![
            WordTimestamp { word: "alpha".into(), start: 0.0, end: 1.0 },
            WordTimestamp { word: "beta".into(), start: 1.0, end: 2.0 },
            WordTimestamp { word: "gamma".into(), start: 2.0, end: 3.0 },
        ];
        TranscriptData::from_words(words, None)
    }

    #[test]
    fn test_time_for_offset_with_words() {
        let transcript = transcript_with_words();
        // "alpha beta gamma": offset 0 is inside "alpha"
        assert_eq!(time_for_offset(&transcript, 0), 0.0);
        // offset 7 is inside "beta" (alpha=5 chars + space)
        assert_eq!(time_for_offset(&transcript, 7), 1.0);
        // offset past the end maps to the last word
        assert_eq!(time_for_offset(&transcript, 100), 2.0);
    }

    #[test]
    fn test_time_for_offset_reading_rate_estimate() {
        let transcript =
            TranscriptData::from_text("one two three four five".to_string(), None, 0.0);
        // 2 words before offset 8 ("one two ")
        let t = time_for_offset(&transcript, 8);
        assert!((t - 2.0 * SECONDS_PER_WORD).abs() < 1e-9);
    }

    #[test]
    fn test_spans_cover_whole_text() {
        let text = "abcdefghij";
        let boundaries = vec![
            TopicBoundary { offset: 0, topic: "a".into() },
            TopicBoundary { offset: 4, topic: "b".into() },
            TopicBoundary { offset: 7, topic: "c".into() },
        ];

        let spans = spans_from_boundaries(text, &boundaries);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].0, 0);
        assert_eq!(spans.last().unwrap().1, text.len());

        // Contiguous: each span starts where the previous ended
        for pair in spans.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn test_whole_transcript_chapter() {
        let transcript = TranscriptData::from_text(
            "A short talk about nothing in particular.".to_string(),
            None,
            30.0,
        );
        let chapter = whole_transcript_chapter(&transcript);
        assert_eq!(chapter.start_time, 0.0);
        assert_eq!(chapter.end_time, 30.0);
        assert!(chapter.title.starts_with("A short talk about nothing"));
    }

    #[test]
    fn test_fallback_description_stays_within_bound() {
        let text = "x".repeat(400);
        let description = fallback_description(&text);
        assert!(description.len() <= 150);
        assert!(description.ends_with("..."));

        // Short text passes through untouched
        let short = fallback_description("A brief remark. ");
        assert_eq!(short, "A brief remark.");
    }

    #[test]
    fn test_fallback_title_ellipsis_only_when_truncated() {
        assert_eq!(fallback_title("Just a few words"), "Just a few words");
        assert_eq!(
            fallback_title("one two three four five six"),
            "one two three four five..."
        );
    }
}
