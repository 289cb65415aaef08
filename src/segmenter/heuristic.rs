//! Deterministic stride-based segmentation fallback.
//!
//! Walks the text in fixed character strides and snaps each cut to the
//! nearest sentence end so chapters do not break mid-sentence. Needs no
//! external capability, so it always succeeds.

use super::{
    fallback_description, fallback_title, floor_char_boundary, spans_from_boundaries,
    time_for_offset, Chapter, Segmenter, SegmenterConfig, TopicBoundary,
};
use crate::error::Result;
use crate::transcription::TranscriptData;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Sentence-ending punctuation followed by whitespace.
fn sentence_end_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s").expect("valid regex"))
}

/// Stride-based heuristic segmenter.
pub struct HeuristicSegmenter {
    config: SegmenterConfig,
}

impl HeuristicSegmenter {
    pub fn new() -> Self {
        Self::with_config(SegmenterConfig::default())
    }

    pub fn with_config(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Compute boundaries at fixed strides, snapped to sentence ends.
    ///
    /// Position 0 is always seeded as an implicit boundary. At each stride
    /// point the surrounding window is searched for sentence-ending
    /// punctuation; if none is found the cut lands on the raw stride.
    pub fn boundaries(text: &str, config: &SegmenterConfig) -> Vec<TopicBoundary> {
        let mut boundaries = vec![TopicBoundary {
            offset: 0,
            topic: "Introduction".to_string(),
        }];

        let stride = config.stride_chars.max(1);
        let radius = config.snap_radius_chars;

        let mut cut = stride;
        while cut < text.len() {
            let search_start = floor_char_boundary(text, cut.saturating_sub(radius));
            let search_end = floor_char_boundary(text, (cut + radius).min(text.len()));
            let window = &text[search_start..search_end];

            let offset = match sentence_end_regex().find(window) {
                // +1 lands just past the punctuation, at the whitespace
                Some(m) => search_start + m.start() + 1,
                None => floor_char_boundary(text, cut),
            };

            boundaries.push(TopicBoundary {
                offset,
                topic: "Topic".to_string(),
            });

            cut += stride;
        }

        boundaries
    }
}

impl Default for HeuristicSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Segmenter for HeuristicSegmenter {
    async fn segment(&self, transcript: &TranscriptData) -> Result<Vec<Chapter>> {
        let text = &transcript.full_text;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let boundaries = Self::boundaries(text, &self.config);
        debug!("Heuristic segmentation found {} boundaries", boundaries.len());

        let spans = spans_from_boundaries(text, &boundaries);

        let chapters = spans
            .into_iter()
            .filter_map(|(start, end, _topic)| {
                let chapter_text = text[start..end].trim();
                if chapter_text.len() < self.config.min_chapter_chars {
                    return None;
                }

                Some(Chapter {
                    start_time: time_for_offset(transcript, start),
                    end_time: time_for_offset(transcript, end),
                    title: fallback_title(chapter_text),
                    description: fallback_description(chapter_text),
                    text: chapter_text.to_string(),
                })
            })
            .collect();

        Ok(chapters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SegmenterConfig {
        SegmenterConfig {
            stride_chars: 100,
            snap_radius_chars: 30,
            min_chapter_chars: 10,
            ..SegmenterConfig::default()
        }
    }

    #[test]
    fn test_boundaries_seed_position_zero() {
        let text = "Short text.";
        let boundaries = HeuristicSegmenter::boundaries(text, &small_config());
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].offset, 0);
    }

    #[test]
    fn test_boundaries_snap_to_sentence_end() {
        // Sentences of ~40 chars each; stride 100 should snap near a period
        let sentence = "This is a sentence about some subject. ";
        let text = sentence.repeat(10);
        let boundaries = HeuristicSegmenter::boundaries(&text, &small_config());

        assert!(boundaries.len() > 1);
        for boundary in boundaries.iter().skip(1) {
            let before = text.as_bytes()[boundary.offset - 1];
            assert!(
                before == b'.' || before == b'!' || before == b'?',
                "boundary at {} not after punctuation",
                boundary.offset
            );
        }
    }

    #[test]
    fn test_boundaries_raw_cut_without_punctuation() {
        let text = "word ".repeat(60);
        let boundaries = HeuristicSegmenter::boundaries(&text, &small_config());
        // No sentence ends anywhere, cuts land on raw strides
        assert!(boundaries.iter().skip(1).any(|b| b.offset % 100 == 0));
    }

    #[tokio::test]
    async fn test_segment_drops_short_chapters() {
        let sentence = "Another sentence that talks about a topic in detail. ";
        let transcript = TranscriptData::from_text(sentence.repeat(8), None, 120.0);

        let segmenter = HeuristicSegmenter::with_config(SegmenterConfig {
            stride_chars: 100,
            snap_radius_chars: 30,
            min_chapter_chars: 50,
            ..SegmenterConfig::default()
        });

        let chapters = segmenter.segment(&transcript).await.unwrap();
        assert!(!chapters.is_empty());
        for chapter in &chapters {
            assert!(chapter.text.len() >= 50);
            assert!(chapter.start_time <= chapter.end_time);
        }
    }

    #[tokio::test]
    async fn test_segment_empty_transcript() {
        let transcript = TranscriptData::from_text("   ".to_string(), None, 0.0);
        let chapters = HeuristicSegmenter::new().segment(&transcript).await.unwrap();
        assert!(chapters.is_empty());
    }
}
