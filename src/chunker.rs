//! Word-boundary chunking under a hard length budget.
//!
//! Lengths are counted in chars (Unicode scalar values), never bytes, so a
//! split can never land inside a multi-byte character. A split at a word
//! boundary consumes exactly one space; a hard break consumes nothing. That
//! makes the output reversible with [`reassemble`].

use crate::data::{Segment, TruncationState};
use crate::errors::ChunkerError;
use crate::utils::normalize_inline_whitespace;

/// Splits text into ordered segments no longer than `max_len` chars.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunker {
    max_len: usize,
}

impl Chunker {
    /// Create a chunker with a per-segment budget of `max_len` chars.
    pub fn new(max_len: usize) -> Result<Self, ChunkerError> {
        if max_len == 0 {
            return Err(ChunkerError::ZeroBudget);
        }
        Ok(Self { max_len })
    }

    /// Per-segment budget in chars.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Chunk `text`, returning an empty sequence for empty input.
    pub fn chunk(&self, text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        self.push_segments(text, 0, &mut segments);
        segments
    }

    /// Like [`Chunker::chunk`], but reports text with no visible content as
    /// [`ChunkerError::DegenerateInput`].
    pub fn split(&self, text: &str) -> Result<Vec<Segment>, ChunkerError> {
        if text.trim().is_empty() {
            return Err(ChunkerError::DegenerateInput);
        }
        Ok(self.chunk(text))
    }

    /// Normalize and chunk each paragraph independently, numbering segments
    /// contiguously across the whole article.
    ///
    /// Degenerate paragraphs (nothing left after normalization) contribute
    /// no segments.
    pub fn chunk_paragraphs<I, S>(&self, paragraphs: I) -> Vec<Segment>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut segments: Vec<Segment> = Vec::new();
        for paragraph in paragraphs {
            let normalized = normalize_inline_whitespace(paragraph.as_ref());
            let chunked = match self.split(&normalized) {
                Ok(chunked) => chunked,
                Err(ChunkerError::DegenerateInput | ChunkerError::ZeroBudget) => continue,
            };
            let offset = segments.len() as u32;
            segments.extend(chunked.into_iter().map(|mut segment| {
                segment.ordinal += offset;
                segment
            }));
        }
        segments
    }

    fn push_segments(&self, text: &str, first_ordinal: u32, out: &mut Vec<Segment>) {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        if total == 0 {
            return;
        }

        // Byte offset of every char position, plus the end of the string.
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(idx, _)| idx)
            .chain(std::iter::once(text.len()))
            .collect();
        let slice = |from: usize, to: usize| text[offsets[from]..offsets[to]].to_string();

        let mut ordinal = first_ordinal;
        let mut start = 0usize;
        while start < total {
            if total - start <= self.max_len {
                out.push(segment(
                    ordinal,
                    slice(start, total),
                    total - start,
                    TruncationState::Intact,
                ));
                break;
            }

            let window_end = start + self.max_len;
            let boundary = (start + 1..=window_end)
                .rev()
                .find(|&pos| chars[pos] == ' ' && pos + 1 < total);

            match boundary {
                Some(pos) => {
                    out.push(segment(
                        ordinal,
                        slice(start, pos),
                        pos - start,
                        TruncationState::WordBoundary,
                    ));
                    start = pos + 1;
                }
                None => {
                    out.push(segment(
                        ordinal,
                        slice(start, window_end),
                        self.max_len,
                        TruncationState::HardBreak,
                    ));
                    start = window_end;
                }
            }
            ordinal += 1;
        }
    }
}

fn segment(ordinal: u32, text: String, char_len: usize, state: TruncationState) -> Segment {
    Segment {
        ordinal,
        text,
        char_len,
        truncated: state == TruncationState::HardBreak,
        state,
    }
}

/// Split `text` into segments of at most `max_len` chars.
///
/// Returns an empty sequence for empty text or a zero budget.
pub fn chunk(text: &str, max_len: usize) -> Vec<Segment> {
    match Chunker::new(max_len) {
        Ok(chunker) => chunker.chunk(text),
        Err(_) => Vec::new(),
    }
}

/// Rebuild the chunked text: one space after every word-boundary segment,
/// nothing after hard breaks.
pub fn reassemble(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push_str(&segment.text);
        if segment.state == TruncationState::WordBoundary {
            out.push(' ');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(segments: &[Segment]) -> Vec<&str> {
        segments.iter().map(|segment| segment.text.as_str()).collect()
    }

    #[test]
    fn splits_pangram_on_word_boundaries() {
        let text = "The quick brown fox jumps over the lazy dog";
        let segments = chunk(text, 10);
        assert_eq!(
            texts(&segments),
            vec!["The quick", "brown fox", "jumps over", "the lazy", "dog"]
        );
        let total: usize = segments.iter().map(|segment| segment.char_len).sum();
        assert_eq!(total + segments.len() - 1, text.chars().count());
        assert!(segments.iter().all(|segment| !segment.truncated));
        assert_eq!(reassemble(&segments), text);
    }

    #[test]
    fn empty_text_yields_no_segments() {
        assert!(chunk("", 10).is_empty());
        let chunker = Chunker::new(10).unwrap();
        assert_eq!(chunker.split(""), Err(ChunkerError::DegenerateInput));
        assert_eq!(chunker.split("  \n "), Err(ChunkerError::DegenerateInput));
    }

    #[test]
    fn short_text_is_a_single_intact_segment() {
        let segments = chunk("Shares rose.", 12);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].ordinal, 0);
        assert_eq!(segments[0].char_len, 12);
        assert_eq!(segments[0].state, TruncationState::Intact);
        assert!(!segments[0].truncated);
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert_eq!(Chunker::new(0), Err(ChunkerError::ZeroBudget));
        assert!(chunk("anything", 0).is_empty());
    }

    #[test]
    fn overlong_token_is_hard_broken() {
        let segments = chunk("supercalifragilistic ok", 8);
        assert_eq!(texts(&segments), vec!["supercal", "ifragili", "stic ok"]);
        assert!(segments[0].truncated);
        assert!(segments[1].truncated);
        assert_eq!(segments[2].state, TruncationState::Intact);
        assert_eq!(reassemble(&segments), "supercalifragilistic ok");
    }

    #[test]
    fn space_right_after_window_is_used() {
        let segments = chunk("abcd efgh", 4);
        assert_eq!(texts(&segments), vec!["abcd", "efgh"]);
        assert_eq!(segments[0].state, TruncationState::WordBoundary);
    }

    #[test]
    fn trailing_space_is_kept_rather_than_dropped() {
        let segments = chunk("abc ", 3);
        assert_eq!(texts(&segments), vec!["abc", " "]);
        assert_eq!(reassemble(&segments), "abc ");
    }

    #[test]
    fn multibyte_text_is_measured_in_chars() {
        let text = "café déjà vu über straße";
        let segments = chunk(text, 6);
        assert!(segments.iter().all(|segment| segment.char_len <= 6));
        assert!(
            segments
                .iter()
                .all(|segment| segment.char_len == segment.text.chars().count())
        );
        assert_eq!(reassemble(&segments), text);
    }

    #[test]
    fn chunk_paragraphs_numbers_contiguously_and_normalizes() {
        let chunker = Chunker::new(10).unwrap();
        let segments = chunker.chunk_paragraphs([
            "  The quick\n brown fox ",
            "   ",
            "jumps over the lazy dog",
        ]);
        let ordinals: Vec<u32> = segments.iter().map(|segment| segment.ordinal).collect();
        assert_eq!(ordinals, (0..segments.len() as u32).collect::<Vec<_>>());
        assert_eq!(
            texts(&segments),
            vec!["The quick", "brown fox", "jumps over", "the lazy", "dog"]
        );
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Revenue grew 12% year over year while margins compressed slightly.";
        assert_eq!(chunk(text, 16), chunk(text, 16));
    }
}
