//! Property tests for the chunker boundary contract.

use proptest::prelude::*;
use sentiment_cache::{Chunker, TruncationState, chunk, reassemble};

fn article_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z ]{0,200}",
        "[A-Za-z0-9.,!? ]{0,300}",
        "[a-zé漢 ]{0,120}",
        "\\PC{0,150}",
    ]
}

proptest! {
    #[test]
    fn reassembly_restores_the_input(text in article_text(), max_len in 1usize..64) {
        let segments = chunk(&text, max_len);
        prop_assert_eq!(reassemble(&segments), text);
    }

    #[test]
    fn segments_respect_the_budget(text in article_text(), max_len in 1usize..64) {
        let segments = chunk(&text, max_len);
        let consumed = segments
            .iter()
            .filter(|segment| segment.state == TruncationState::WordBoundary)
            .count();
        let covered: usize = segments.iter().map(|segment| segment.char_len).sum();
        prop_assert_eq!(covered + consumed, text.chars().count());
        for (idx, segment) in segments.iter().enumerate() {
            prop_assert!(segment.char_len >= 1);
            prop_assert!(segment.char_len <= max_len);
            prop_assert_eq!(segment.char_len, segment.text.chars().count());
            prop_assert_eq!(segment.ordinal as usize, idx);
            prop_assert_eq!(segment.truncated, segment.state == TruncationState::HardBreak);
        }
        if let Some(last) = segments.last() {
            prop_assert_eq!(last.state, TruncationState::Intact);
        }
    }

    #[test]
    fn chunking_is_deterministic(text in article_text(), max_len in 1usize..64) {
        prop_assert_eq!(chunk(&text, max_len), chunk(&text, max_len));
    }

    #[test]
    fn paragraph_ordinals_stay_contiguous(
        paragraphs in prop::collection::vec("[a-z ]{0,80}", 0..6),
        max_len in 1usize..32,
    ) {
        let chunker = Chunker::new(max_len).unwrap();
        let segments = chunker.chunk_paragraphs(&paragraphs);
        for (idx, segment) in segments.iter().enumerate() {
            prop_assert_eq!(segment.ordinal as usize, idx);
            prop_assert!(segment.char_len <= max_len);
        }
    }
}

#[test]
fn pangram_splits_on_word_boundaries() {
    let texts: Vec<String> = chunk("The quick brown fox jumps over the lazy dog", 10)
        .into_iter()
        .map(|segment| segment.text)
        .collect();
    assert_eq!(
        texts,
        vec!["The quick", "brown fox", "jumps over", "the lazy", "dog"]
    );
}
