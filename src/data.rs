use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::chunking::ORDINAL_KEY_WIDTH;
use crate::constants::coordinator::{ARTICLE_ID_HEX_CHARS, KEY_SEPARATOR};
use crate::hash::url_hash;

pub use crate::types::{ArticleId, Keyword, Namespace, OrdinalKey, StoreKey, Symbol, UrlHash};

/// Content address of one article in the deep cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArticleKey {
    /// Producer/version namespace.
    pub namespace: Namespace,
    /// Symbol the article is filed under.
    pub symbol: Symbol,
    /// Hash of the canonical article URL.
    pub url_hash: UrlHash,
}

impl ArticleKey {
    /// Build a key from its three parts.
    pub fn new(
        namespace: impl Into<Namespace>,
        symbol: impl Into<Symbol>,
        url_hash: impl Into<UrlHash>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            symbol: symbol.into(),
            url_hash: url_hash.into(),
        }
    }

    /// Store key rendered as `{namespace}.{symbol}.{url_hash}`.
    pub fn store_key(&self) -> StoreKey {
        format!(
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            self.namespace, self.symbol, self.url_hash
        )
    }
}

impl fmt::Display for ArticleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.store_key())
    }
}

/// How a segment relates to the text it was cut from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationState {
    /// The whole input fit in a single segment.
    Intact,
    /// Split at a word boundary; one space was consumed after this segment.
    WordBoundary,
    /// Hard split at the length budget; nothing was consumed.
    HardBreak,
}

/// A bounded slice of article text prepared for classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Position within the article, contiguous from 0.
    pub ordinal: u32,
    /// Segment text, verbatim from the (normalized) input.
    pub text: String,
    /// Length in chars (Unicode scalar values).
    pub char_len: usize,
    /// `true` when the segment was hard-broken inside a token.
    pub truncated: bool,
    /// How the segment ended.
    pub state: TruncationState,
}

/// Sentiment label assigned by the classification gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    /// Net positive tone.
    Positive,
    /// No clear tone.
    Neutral,
    /// Net negative tone.
    Negative,
}

/// Document shape of one segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkShape {
    /// One short sentence ending in terminal punctuation.
    Sentence,
    /// Two or more sentences.
    Paragraph,
    /// Anything else (headlines, fragments, hard-broken text).
    Random,
}

/// Whether the gateway actually scored the segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOutcome {
    /// The gateway returned a label for the segment.
    Classified,
    /// Skipped with a zero-confidence neutral result.
    EmptyVocabulary,
}

/// Per-segment classification output. Owned by exactly one `ArticleRecord`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentResult {
    /// Ordinal of the source segment.
    pub ordinal: u32,
    /// Symbol of the owning article.
    pub symbol: Symbol,
    /// Distinct unigrams plus distinct adjacent bigrams after noise removal.
    pub n_grams: usize,
    /// Gateway token count, or whitespace tokens when it reports none.
    pub token_count: usize,
    /// Whitespace-separated words.
    pub word_count: usize,
    /// Length in chars.
    pub char_len: usize,
    /// Label assigned by the gateway.
    pub sentiment_label: SentimentLabel,
    /// Confidence in `[0, 1]`.
    pub sentiment_score: f64,
    /// How the source segment was cut.
    pub truncation_state: TruncationState,
    /// Document shape of the segment text.
    pub shape: ChunkShape,
    /// Whether the gateway actually scored it.
    pub outcome: SegmentOutcome,
    /// Top keywords, most frequent first.
    pub keywords: Vec<Keyword>,
}

/// Aggregated sentiment for one article; the unit stored in the deep cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Record layout version.
    pub schema_version: u32,
    /// Short article identifier.
    pub article_id: ArticleId,
    /// Symbol the article is filed under.
    pub symbol: Symbol,
    /// Hash of the canonical article URL.
    pub url_hash: UrlHash,
    /// When the record was computed.
    pub computed_at: DateTime<Utc>,
    /// Segments that produced a result (`segments.len()`).
    pub chunk_count: usize,
    /// Segments the chunker produced, including failed ones.
    pub segments_attempted: usize,
    /// Segments skipped after a `Transient` gateway failure (retryable).
    pub transient_failures: usize,
    /// Segments lost to an `Unknown` gateway failure.
    pub unknown_failures: usize,
    /// `transient_failures + unknown_failures`.
    pub failed_segments: usize,
    /// Segments shaped as one sentence.
    pub sentence_count: usize,
    /// Segments holding several sentences.
    pub paragraph_count: usize,
    /// Segments of any other shape.
    pub random_count: usize,
    /// Segments labelled positive.
    pub positive_count: usize,
    /// Segments labelled neutral.
    pub neutral_count: usize,
    /// Segments labelled negative.
    pub negative_count: usize,
    /// Segments skipped for having no vocabulary.
    pub empty_vocabulary_count: usize,
    /// Sum of segment token counts.
    pub total_tokens: usize,
    /// Sum of segment word counts.
    pub total_words: usize,
    /// Sum of segment char lengths.
    pub total_chars: usize,
    /// The article had no classifiable content at all.
    pub no_content: bool,
    /// Some segments failed and are missing from `segments`.
    pub incomplete: bool,
    /// Per-segment results keyed by [`ordinal_key`].
    pub segments: BTreeMap<OrdinalKey, SegmentResult>,
}

impl ArticleRecord {
    /// Segment results in ordinal order.
    pub fn ordered_segments(&self) -> impl Iterator<Item = &SegmentResult> {
        self.segments.values()
    }

    /// Returns every invariant violation found in this record.
    ///
    /// An empty list means the record is internally consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let labelled = self.positive_count + self.neutral_count + self.negative_count;
        if labelled != self.chunk_count {
            problems.push(format!(
                "sentiment counters sum to {labelled}, chunk_count is {}",
                self.chunk_count
            ));
        }
        let shaped = self.sentence_count + self.paragraph_count + self.random_count;
        if shaped != self.chunk_count {
            problems.push(format!(
                "shape counters sum to {shaped}, chunk_count is {}",
                self.chunk_count
            ));
        }
        if self.segments.len() != self.chunk_count {
            problems.push(format!(
                "{} segments present, chunk_count is {}",
                self.segments.len(),
                self.chunk_count
            ));
        }
        if self.chunk_count + self.failed_segments != self.segments_attempted {
            problems.push(format!(
                "chunk_count {} + failed {} != attempted {}",
                self.chunk_count, self.failed_segments, self.segments_attempted
            ));
        }
        if self.transient_failures + self.unknown_failures != self.failed_segments {
            problems.push(format!(
                "transient {} + unknown {} != failed {}",
                self.transient_failures, self.unknown_failures, self.failed_segments
            ));
        }
        if self.incomplete != (self.failed_segments > 0) {
            problems.push("incomplete flag disagrees with failed_segments".into());
        }
        if self.no_content != (self.segments_attempted == 0) {
            problems.push("no_content flag disagrees with segments_attempted".into());
        }

        let (mut tokens, mut words, mut chars) = (0usize, 0usize, 0usize);
        let (mut positive, mut neutral, mut negative) = (0usize, 0usize, 0usize);
        for (key, segment) in &self.segments {
            if *key != ordinal_key(segment.ordinal) {
                problems.push(format!(
                    "segment key '{key}' does not match ordinal {}",
                    segment.ordinal
                ));
            }
            if !(0.0..=1.0).contains(&segment.sentiment_score) {
                problems.push(format!(
                    "segment {key} score {} outside [0, 1]",
                    segment.sentiment_score
                ));
            }
            tokens += segment.token_count;
            words += segment.word_count;
            chars += segment.char_len;
            match segment.sentiment_label {
                SentimentLabel::Positive => positive += 1,
                SentimentLabel::Neutral => neutral += 1,
                SentimentLabel::Negative => negative += 1,
            }
        }
        if (positive, neutral, negative)
            != (self.positive_count, self.neutral_count, self.negative_count)
        {
            problems.push("sentiment counters disagree with segment labels".into());
        }
        if tokens != self.total_tokens || words != self.total_words || chars != self.total_chars {
            problems.push("token/word/char totals disagree with segments".into());
        }
        problems
    }
}

/// Zero-padded ordinal map key (`7` -> `0000000007`).
///
/// The width covers the whole `u32` range, so lexical key order is numeric
/// order for every possible ordinal.
pub fn ordinal_key(ordinal: u32) -> OrdinalKey {
    format!("{ordinal:0width$}", width = ORDINAL_KEY_WIDTH)
}

/// One article as handed over by the text source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleInput {
    /// Symbol the article is filed under.
    pub symbol: Symbol,
    /// Hash of the canonical article URL.
    pub url_hash: UrlHash,
    /// Short article identifier.
    pub article_id: ArticleId,
    /// Raw paragraph/content strings in document order.
    pub paragraphs: Vec<String>,
}

impl ArticleInput {
    /// Build an input from a URL, deriving the `url_hash` and a default
    /// `article_id` (leading hex chars of the hash).
    pub fn from_url(
        symbol: impl Into<Symbol>,
        url: &str,
        paragraphs: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let url_hash = url_hash(url);
        let article_id = url_hash[..ARTICLE_ID_HEX_CHARS].to_string();
        Self {
            symbol: symbol.into(),
            url_hash,
            article_id,
            paragraphs: paragraphs.into_iter().map(Into::into).collect(),
        }
    }

    /// Deep-cache key of this article under `namespace`.
    pub fn key(&self, namespace: &str) -> ArticleKey {
        ArticleKey::new(namespace, self.symbol.clone(), self.url_hash.clone())
    }
}
