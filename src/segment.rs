//! Section-aware text segmentation.
//!
//! Splits raw extracted document text into `(section, content)` chunks with
//! a bounded word count and configurable overlap. Lines are classified as
//! headings or body text with a deliberately blunt heuristic; body text
//! accumulates under the most recent heading and is flushed as one chunk or
//! a sliding sequence of overlapping word windows.
//!
//! # Algorithm
//!
//! 1. Scan line by line, collapsing runs of whitespace inside each line.
//! 2. A non-blank line of at most 60 characters is a heading when it starts
//!    with digits followed by a period, when its letters are entirely
//!    uppercase, or when it does not end in `.`, `!`, or `?`.
//! 3. A heading flushes the accumulated body buffer under the *previous*
//!    section label, then becomes the current label. The label starts out
//!    as `"Introduction"` for content before any heading.
//! 4. Flushing emits the buffer verbatim when it fits the chunk size, or as
//!    word windows of the chunk size advancing by `size − overlap`, with the
//!    final window ending exactly at the buffer's last word.
//!
//! The heading rules misfire on short declarative lines without terminal
//! punctuation; that behavior is part of the contract and is covered by
//! tests rather than "fixed".
//!
//! # Example
//!
//! ```rust
//! use docchat::segment::TextSegmenter;
//!
//! let segmenter = TextSegmenter::new(200, 50);
//! let segments = segmenter.segment("SUMMARY\nAll systems nominal.");
//! assert_eq!(segments.len(), 1);
//! assert_eq!(segments[0].section, "SUMMARY");
//! assert_eq!(segments[0].content, "All systems nominal.");
//! ```

use crate::models::DEFAULT_SECTION;

/// Longest line that can still be classified as a heading.
const MAX_HEADING_CHARS: usize = 60;

/// One emitted chunk: a section label plus whitespace-normalized content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub section: String,
    pub content: String,
}

/// Word-window segmenter with heading detection.
#[derive(Debug, Clone)]
pub struct TextSegmenter {
    chunk_size: usize,
    overlap: usize,
}

impl TextSegmenter {
    /// `chunk_size` and `overlap` are word counts; callers must keep
    /// `overlap < chunk_size` (validated at config load).
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Split raw text into section-tagged chunks in document order.
    ///
    /// Blank input yields no segments. Output order is emission order; the
    /// caller assigns `chunk_index` from each segment's position.
    pub fn segment(&self, raw_text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut section = DEFAULT_SECTION.to_string();
        let mut buffer: Vec<String> = Vec::new();

        for line in raw_text.lines() {
            let line = normalize_line(line);
            if line.is_empty() {
                continue;
            }
            if is_heading(&line) {
                self.flush(&section, &mut buffer, &mut segments);
                section = line;
            } else {
                buffer.extend(line.split_whitespace().map(str::to_string));
            }
        }
        self.flush(&section, &mut buffer, &mut segments);

        segments
    }

    /// Emit the buffered words under `section` and clear the buffer.
    fn flush(&self, section: &str, buffer: &mut Vec<String>, segments: &mut Vec<Segment>) {
        if buffer.is_empty() {
            return;
        }

        if buffer.len() <= self.chunk_size {
            segments.push(Segment {
                section: section.to_string(),
                content: buffer.join(" "),
            });
        } else {
            let step = self.chunk_size - self.overlap;
            let mut start = 0;
            loop {
                let end = (start + self.chunk_size).min(buffer.len());
                segments.push(Segment {
                    section: section.to_string(),
                    content: buffer[start..end].join(" "),
                });
                if end == buffer.len() {
                    break;
                }
                start += step;
            }
        }

        buffer.clear();
    }
}

/// Collapse interior whitespace runs and trim the ends of one line.
fn normalize_line(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Heading heuristic: length-gated disjunction of three rules.
fn is_heading(line: &str) -> bool {
    let char_count = line.chars().count();
    if char_count == 0 || char_count > MAX_HEADING_CHARS {
        return false;
    }

    // Rule 1: numbered heading, e.g. "2. Methods".
    let after_digits = line.trim_start_matches(|c: char| c.is_ascii_digit());
    let numbered = after_digits.len() < line.len() && after_digits.starts_with('.');

    // Rule 2: letters only, entirely uppercase (at least one letter).
    let mut letters = line.chars().filter(|c| c.is_alphabetic()).peekable();
    let uppercase = letters.peek().is_some() && letters.all(|c| c.is_uppercase());

    // Rule 3: no terminal punctuation.
    let unterminated = !matches!(line.chars().last(), Some('.') | Some('!') | Some('?'));

    numbered || uppercase || unterminated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("w{}", i)).collect()
    }

    #[test]
    fn blank_input_yields_no_segments() {
        let segmenter = TextSegmenter::new(200, 50);
        assert!(segmenter.segment("").is_empty());
        assert!(segmenter.segment("   \n\n  \t ").is_empty());
    }

    #[test]
    fn sections_tag_their_own_body() {
        let segmenter = TextSegmenter::new(200, 50);
        let segments = segmenter.segment("INTRO\nfoo bar.\nMETHODS\nbaz qux.");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].section, "INTRO");
        assert_eq!(segments[0].content, "foo bar.");
        assert_eq!(segments[1].section, "METHODS");
        assert_eq!(segments[1].content, "baz qux.");
    }

    #[test]
    fn body_before_first_heading_gets_sentinel() {
        let segmenter = TextSegmenter::new(200, 50);
        let segments = segmenter.segment("some opening text.\nDETAILS\nmore text.");
        assert_eq!(segments[0].section, "Introduction");
        assert_eq!(segments[0].content, "some opening text.");
        assert_eq!(segments[1].section, "DETAILS");
    }

    #[test]
    fn long_body_keeps_sentinel_when_no_heading_seen() {
        let segmenter = TextSegmenter::new(200, 50);
        let mut line = words(450).join(" ");
        line.push('.');
        let segments = segmenter.segment(&line);
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| s.section == "Introduction"));
    }

    #[test]
    fn window_count_matches_formula() {
        // n = 10, size = 4, overlap = 1 → stride 3 → ceil((10-4)/3)+1 = 3.
        let segmenter = TextSegmenter::new(4, 1);
        let segments = segmenter.segment(&format!("{}.", words(10).join(" ")));
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn windows_cover_the_word_sequence_exactly() {
        let size = 8;
        let overlap = 3;
        let n = 50;
        let segmenter = TextSegmenter::new(size, overlap);
        let original = words(n);
        let segments = segmenter.segment(&format!("{}.", original.join(" ")));

        let mut reconstructed: Vec<String> = Vec::new();
        for (i, seg) in segments.iter().enumerate() {
            let segment_words: Vec<String> =
                seg.content.split_whitespace().map(str::to_string).collect();
            assert!(segment_words.len() <= size, "chunk exceeds configured size");
            let skip = if i == 0 { 0 } else { overlap };
            reconstructed.extend(segment_words.into_iter().skip(skip));
        }
        // The trailing '.' rides on the last word.
        let mut expected = original;
        if let Some(last) = expected.last_mut() {
            last.push('.');
        }
        assert_eq!(reconstructed, expected);
    }

    #[test]
    fn final_window_reaches_the_end() {
        let segmenter = TextSegmenter::new(4, 1);
        let segments = segmenter.segment(&format!("{}.", words(11).join(" ")));
        let last = segments.last().unwrap();
        assert!(last.content.ends_with("w10."));
        // No trailing empty window.
        assert!(segments.iter().all(|s| !s.content.is_empty()));
    }

    #[test]
    fn heading_rules() {
        assert!(is_heading("1. Overview"));
        assert!(is_heading("12. Results."));
        assert!(is_heading("EXECUTIVE SUMMARY"));
        // Known misfire: short line without terminal punctuation.
        assert!(is_heading("This line has no period"));
        assert!(!is_heading("A short declarative sentence."));
        assert!(!is_heading(
            "This sentence is far longer than sixty characters and therefore can never be a heading"
        ));
    }

    #[test]
    fn interior_whitespace_is_collapsed() {
        let segmenter = TextSegmenter::new(200, 50);
        let segments = segmenter.segment("NOTES\nalpha\t\tbeta   gamma.");
        assert_eq!(segments[0].content, "alpha beta gamma.");
    }
}
