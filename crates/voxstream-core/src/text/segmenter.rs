//! Sentence-aware text segmentation for synthesis.
//!
//! Segments never exceed the configured length (in characters) unless a
//! single word is longer than the limit, in which case that word is cut at
//! the limit. The split is deterministic and keeps no state between calls.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::normalize::normalize_text;
use crate::error::{VoxstreamError, VoxstreamResult};

/// Default maximum segment length in characters
pub const DEFAULT_MAX_SEGMENT_LENGTH: usize = 400;

/// One bounded slice of input text, synthesized as a single unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSegment {
    /// 1-based position within the request
    pub index: usize,
    /// Segment text
    pub content: String,
    /// Byte range of `content` within the normalized request text
    pub source_span: Range<usize>,
}

impl TextSegment {
    /// Length of the content in characters
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Segmenter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Maximum characters per segment
    pub max_segment_length: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_segment_length: DEFAULT_MAX_SEGMENT_LENGTH,
        }
    }
}

impl SegmenterConfig {
    /// Validate segmenter configuration
    pub fn validate(&self) -> VoxstreamResult<()> {
        if self.max_segment_length == 0 {
            return Err(VoxstreamError::configuration(
                "max_segment_length must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Splits request text into [`TextSegment`]s
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    /// Create a segmenter with the given configuration
    #[must_use]
    pub const fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Maximum segment length this segmenter enforces
    #[must_use]
    pub const fn max_segment_length(&self) -> usize {
        self.config.max_segment_length
    }

    /// Segment text with the configured maximum length
    #[must_use]
    pub fn segment(&self, text: &str) -> Vec<TextSegment> {
        segment_text(text, self.config.max_segment_length)
    }
}

/// Normalize `text` and split it into segments of at most `max_len` characters.
///
/// Empty or whitespace-only input yields an empty vector.
#[must_use]
pub fn segment_text(text: &str, max_len: usize) -> Vec<TextSegment> {
    let max_len = max_len.max(1);
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut spans = Vec::new();
    if normalized.chars().count() <= max_len {
        spans.push(0..normalized.len());
    } else {
        for sentence in sentence_spans(&normalized) {
            split_long_span(&normalized, sentence, max_len, &mut spans);
        }
    }

    debug!(
        "Segmented {} chars into {} segments (max_len={})",
        normalized.len(),
        spans.len(),
        max_len
    );

    spans
        .into_iter()
        .enumerate()
        .map(|(i, span)| TextSegment {
            index: i + 1,
            content: normalized[span.clone()].to_string(),
            source_span: span,
        })
        .collect()
}

fn is_sentence_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\u{2026}')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201D}' | '\u{2019}')
}

/// Sentence boundaries: terminal punctuation (plus closing quotes) followed
/// by whitespace or end of text.
fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        if !is_sentence_terminal(chars[i].1) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && (is_sentence_terminal(chars[j].1) || is_closing(chars[j].1)) {
            j += 1;
        }

        if j == chars.len() || chars[j].1.is_whitespace() {
            let end = chars.get(j).map_or(text.len(), |&(byte, _)| byte);
            push_trimmed(text, start..end, &mut spans);
            start = end;
        }
        i = j;
    }

    push_trimmed(text, start..text.len(), &mut spans);
    spans
}

fn push_trimmed(text: &str, range: Range<usize>, out: &mut Vec<Range<usize>>) {
    let slice = &text[range.clone()];
    let lead = slice.len() - slice.trim_start().len();
    let len = slice.trim().len();
    if len > 0 {
        out.push(range.start + lead..range.start + lead + len);
    }
}

/// Split a span that may exceed `max_len` at the last whitespace at or before
/// `max_len`, force-cutting words with no whitespace in range.
fn split_long_span(text: &str, span: Range<usize>, max_len: usize, out: &mut Vec<Range<usize>>) {
    let mut start = span.start;
    let end = span.end;

    while start < end {
        let piece = &text[start..end];
        if piece.chars().count() <= max_len {
            push_trimmed(text, start..end, out);
            return;
        }

        let mut last_space = None;
        let mut cut_at_limit = piece.len();
        for (pos, (byte, c)) in piece.char_indices().enumerate().take(max_len + 1) {
            if pos == max_len {
                cut_at_limit = byte;
            }
            if pos > 0 && c.is_whitespace() {
                last_space = Some(byte);
            }
        }

        let cut = last_space.unwrap_or(cut_at_limit);
        push_trimmed(text, start..start + cut, out);

        let rest = &text[start + cut..end];
        start = start + cut + (rest.len() - rest.trim_start().len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(segments: &[TextSegment]) -> Vec<&str> {
        segments.iter().map(|s| s.content.as_str()).collect()
    }

    #[test]
    fn test_empty_input_yields_no_segments() {
        assert!(segment_text("", 100).is_empty());
        assert!(segment_text("  \n\t ", 100).is_empty());
    }

    #[test]
    fn test_short_input_is_single_segment() {
        let segments = segment_text("Hi", 500);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].index, 1);
        assert_eq!(segments[0].content, "Hi");
        assert_eq!(segments[0].source_span, 0..2);
    }

    #[test]
    fn test_splits_on_sentence_boundaries() {
        let segments = segment_text("First one. Second one! Third one?", 15);
        assert_eq!(contents(&segments), vec!["First one.", "Second one!", "Third one?"]);
        let indices: Vec<usize> = segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_decimal_point_is_not_a_boundary() {
        let segments = segment_text("Pi is 3.14 roughly. Done here.", 20);
        assert_eq!(contents(&segments), vec!["Pi is 3.14 roughly.", "Done here."]);
    }

    #[test]
    fn test_closing_quote_stays_with_sentence() {
        let segments = segment_text("He said \"stop.\" Then left.", 16);
        assert_eq!(contents(&segments), vec!["He said \"stop.\"", "Then left."]);
    }

    #[test]
    fn test_long_sentence_splits_at_whitespace() {
        let segments = segment_text("alpha beta gamma delta epsilon", 12);
        assert_eq!(contents(&segments), vec!["alpha beta", "gamma delta", "epsilon"]);
        assert!(segments.iter().all(|s| s.char_len() <= 12));
    }

    #[test]
    fn test_whitespace_exactly_at_limit_is_used() {
        let segments = segment_text("abcde fghij", 5);
        assert_eq!(contents(&segments), vec!["abcde", "fghij"]);
    }

    #[test]
    fn test_unbreakable_word_is_force_split() {
        let segments = segment_text("abcdefghijklmnopqrstuvwxyz", 10);
        assert_eq!(contents(&segments), vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn test_force_split_respects_multibyte_chars() {
        let segments = segment_text("ééééééé", 3);
        assert_eq!(contents(&segments), vec!["ééé", "ééé", "é"]);
    }

    #[test]
    fn test_spans_point_into_normalized_text() {
        let text = "On 2024-03-05 we met.  It went well! Later that day, at 9:30, we ate.";
        let normalized = normalize_text(text);
        let segments = segment_text(text, 40);
        assert!(segments.len() > 1);
        for segment in &segments {
            assert_eq!(&normalized[segment.source_span.clone()], segment.content);
        }
    }

    #[test]
    fn test_unpunctuated_text_splits_at_whitespace() {
        let segments = segment_text("one two three four five", 9);
        assert_eq!(contents(&segments), vec!["one two", "three", "four five"]);
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let text = "Repeatable text. With several sentences! And a question? Yes.";
        assert_eq!(segment_text(text, 20), segment_text(text, 20));
    }

    #[test]
    fn test_segmenter_uses_config() {
        let segmenter = Segmenter::new(SegmenterConfig { max_segment_length: 11 });
        assert_eq!(segmenter.max_segment_length(), 11);
        assert_eq!(segmenter.segment("One two. Three four.").len(), 2);
    }

    #[test]
    fn test_config_validation() {
        assert!(SegmenterConfig::default().validate().is_ok());
        assert!(SegmenterConfig { max_segment_length: 0 }.validate().is_err());
    }
}
