//! Folding segment results into one `ArticleRecord`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::constants::store::RECORD_SCHEMA_VERSION;
use crate::data::{
    ArticleKey, ArticleRecord, ChunkShape, SegmentOutcome, SegmentResult, SentimentLabel,
    ordinal_key,
};
use crate::errors::GatewayError;
use crate::types::{ArticleId, StoreKey, Symbol, UrlHash};

/// Per-article pipeline state.
///
/// Built fresh for every article and owned by that article's pipeline only;
/// nothing in here is shared with another article.
#[derive(Clone, Debug)]
pub struct ArticlePipelineContext {
    /// Deep-cache key the record will be stored under.
    pub key: ArticleKey,
    /// Article id copied onto the record.
    pub article_id: ArticleId,
    /// Segments produced by the chunker.
    pub segments_attempted: usize,
    /// Segments dropped after a transient gateway failure.
    pub transient_failures: usize,
    /// Segments dropped after an unknown gateway failure.
    pub unknown_failures: usize,
    /// Most recent failure, kept for request-level error reporting.
    pub last_failure: Option<GatewayError>,
    /// When computation began; becomes `computed_at`.
    pub started_at: DateTime<Utc>,
}

impl ArticlePipelineContext {
    /// Start a context for `key`.
    pub fn new(key: ArticleKey, article_id: impl Into<ArticleId>) -> Self {
        Self {
            key,
            article_id: article_id.into(),
            segments_attempted: 0,
            transient_failures: 0,
            unknown_failures: 0,
            last_failure: None,
            started_at: Utc::now(),
        }
    }

    /// Rendered store key of the article.
    pub fn store_key(&self) -> StoreKey {
        self.key.store_key()
    }

    /// Record a segment that produced no result.
    pub fn record_failure(&mut self, err: GatewayError) {
        match err {
            GatewayError::Transient(_) => self.transient_failures += 1,
            _ => self.unknown_failures += 1,
        }
        self.last_failure = Some(err);
    }

    /// Segments that failed and are excluded from the aggregate.
    pub fn failed_segments(&self) -> usize {
        self.transient_failures + self.unknown_failures
    }

    /// `true` when at least one segment was attempted and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.segments_attempted > 0 && self.failed_segments() == self.segments_attempted
    }
}

/// Fold `results` for one article into a record.
///
/// Results are folded in ordinal order regardless of input order. With no
/// results and no attempted segments the record is marked `no_content`.
pub fn aggregate(
    symbol: &str,
    url_hash: &str,
    article_id: &str,
    results: Vec<SegmentResult>,
) -> ArticleRecord {
    let attempted = results.len();
    fold(
        symbol.into(),
        url_hash.into(),
        article_id.into(),
        results,
        attempted,
        FailureTally::default(),
    )
}

/// Fold `results` using the attempt/failure bookkeeping held in `context`.
pub fn aggregate_with_context(
    context: &ArticlePipelineContext,
    results: Vec<SegmentResult>,
) -> ArticleRecord {
    fold(
        context.key.symbol.clone(),
        context.key.url_hash.clone(),
        context.article_id.clone(),
        results,
        context.segments_attempted,
        FailureTally {
            transient: context.transient_failures,
            unknown: context.unknown_failures,
        },
    )
}

#[derive(Clone, Copy, Default)]
struct FailureTally {
    transient: usize,
    unknown: usize,
}

fn fold(
    symbol: Symbol,
    url_hash: UrlHash,
    article_id: ArticleId,
    mut results: Vec<SegmentResult>,
    segments_attempted: usize,
    failures: FailureTally,
) -> ArticleRecord {
    let failed_segments = failures.transient + failures.unknown;
    results.sort_by_key(|result| result.ordinal);

    let mut record = ArticleRecord {
        schema_version: RECORD_SCHEMA_VERSION,
        article_id,
        symbol,
        url_hash,
        computed_at: Utc::now(),
        chunk_count: 0,
        segments_attempted,
        transient_failures: failures.transient,
        unknown_failures: failures.unknown,
        failed_segments,
        sentence_count: 0,
        paragraph_count: 0,
        random_count: 0,
        positive_count: 0,
        neutral_count: 0,
        negative_count: 0,
        empty_vocabulary_count: 0,
        total_tokens: 0,
        total_words: 0,
        total_chars: 0,
        no_content: segments_attempted == 0,
        incomplete: failed_segments > 0,
        segments: BTreeMap::new(),
    };

    for result in results {
        match result.sentiment_label {
            SentimentLabel::Positive => record.positive_count += 1,
            SentimentLabel::Neutral => record.neutral_count += 1,
            SentimentLabel::Negative => record.negative_count += 1,
        }
        match result.shape {
            ChunkShape::Sentence => record.sentence_count += 1,
            ChunkShape::Paragraph => record.paragraph_count += 1,
            ChunkShape::Random => record.random_count += 1,
        }
        if result.outcome == SegmentOutcome::EmptyVocabulary {
            record.empty_vocabulary_count += 1;
        }
        record.total_tokens += result.token_count;
        record.total_words += result.word_count;
        record.total_chars += result.char_len;
        record.chunk_count += 1;
        record.segments.insert(ordinal_key(result.ordinal), result);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TruncationState;

    fn result(ordinal: u32, label: SentimentLabel, shape: ChunkShape) -> SegmentResult {
        SegmentResult {
            ordinal,
            symbol: "AAPL".into(),
            n_grams: 3,
            token_count: 10 + ordinal as usize,
            word_count: 8,
            char_len: 40,
            sentiment_label: label,
            sentiment_score: 0.75,
            truncation_state: TruncationState::WordBoundary,
            shape,
            outcome: SegmentOutcome::Classified,
            keywords: vec!["iphone".into()],
        }
    }

    #[test]
    fn aggregate_rolls_up_counts_in_ordinal_order() {
        let mut skipped = result(2, SentimentLabel::Neutral, ChunkShape::Random);
        skipped.outcome = SegmentOutcome::EmptyVocabulary;
        let record = aggregate(
            "AAPL",
            "hash",
            "article-1",
            vec![
                skipped,
                result(0, SentimentLabel::Positive, ChunkShape::Sentence),
                result(1, SentimentLabel::Negative, ChunkShape::Paragraph),
            ],
        );

        assert_eq!(record.chunk_count, 3);
        assert_eq!(
            (record.positive_count, record.neutral_count, record.negative_count),
            (1, 1, 1)
        );
        assert_eq!(
            (record.sentence_count, record.paragraph_count, record.random_count),
            (1, 1, 1)
        );
        assert_eq!(record.empty_vocabulary_count, 1);
        assert_eq!(record.total_tokens, 10 + 11 + 12);
        assert_eq!(record.total_words, 24);
        assert_eq!(record.total_chars, 120);
        assert!(!record.no_content);
        assert!(!record.incomplete);
        let keys: Vec<&String> = record.segments.keys().collect();
        assert_eq!(keys, vec!["0000000000", "0000000001", "0000000002"]);
        assert!(record.invariant_violations().is_empty());
    }

    #[test]
    fn zero_segments_produce_an_explicit_no_content_record() {
        let record = aggregate("AAPL", "hash", "article-0", Vec::new());
        assert_eq!(record.chunk_count, 0);
        assert_eq!(record.positive_count + record.neutral_count + record.negative_count, 0);
        assert_eq!(record.total_tokens, 0);
        assert!(record.no_content);
        assert!(record.segments.is_empty());
        assert!(record.invariant_violations().is_empty());
    }

    #[test]
    fn context_failures_mark_record_incomplete() {
        let key = ArticleKey::new("0001", "AAPL", "hash");
        let mut context = ArticlePipelineContext::new(key, "article-2");
        context.segments_attempted = 3;
        context.record_failure(GatewayError::Transient("timeout".into()));
        context.record_failure(GatewayError::Unknown("boom".into()));
        assert_eq!(context.failed_segments(), 2);
        assert!(!context.all_failed());

        let record = aggregate_with_context(
            &context,
            vec![result(1, SentimentLabel::Positive, ChunkShape::Sentence)],
        );
        assert!(record.incomplete);
        assert_eq!(record.failed_segments, 2);
        assert_eq!(record.transient_failures, 1);
        assert_eq!(record.unknown_failures, 1);
        assert_eq!(record.segments_attempted, 3);
        assert_eq!(record.chunk_count, 1);
        assert_eq!(record.article_id, "article-2");
        assert!(record.invariant_violations().is_empty());

        let mut miscounted = record.clone();
        miscounted.unknown_failures = 0;
        assert!(
            miscounted
                .invariant_violations()
                .iter()
                .any(|problem| problem.contains("transient 1 + unknown 0"))
        );
    }

    #[test]
    fn segments_past_five_digit_ordinals_stay_in_order() {
        let record = aggregate(
            "AAPL",
            "hash",
            "long-article",
            vec![
                result(100_000, SentimentLabel::Positive, ChunkShape::Random),
                result(99_999, SentimentLabel::Negative, ChunkShape::Random),
            ],
        );
        let ordinals: Vec<u32> = record.ordered_segments().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![99_999, 100_000]);
        let keys: Vec<&str> = record.segments.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["0000099999", "0000100000"]);
        assert!(record.invariant_violations().is_empty());
    }

    #[test]
    fn all_failed_requires_attempts() {
        let key = ArticleKey::new("0001", "AAPL", "hash");
        let mut context = ArticlePipelineContext::new(key, "a");
        assert!(!context.all_failed());
        context.segments_attempted = 1;
        context.record_failure(GatewayError::Unknown("x".into()));
        assert!(context.all_failed());
        assert_eq!(context.last_failure, Some(GatewayError::Unknown("x".into())));
    }
}
