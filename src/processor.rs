//! Per-segment processing: counting, shape detection, stop-noise removal,
//! keyword extraction, and one gateway call.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::constants::chunking::{DEFAULT_KEYWORD_LIMIT, MIN_TERM_CHARS, SENTENCE_MAX_WORDS};
use crate::constants::gateway::EMPTY_VOCABULARY_SCORE;
use crate::data::{ChunkShape, Segment, SegmentOutcome, SegmentResult, SentimentLabel};
use crate::errors::GatewayError;
use crate::gateway::ClassificationGateway;
use crate::types::Keyword;
use crate::utils::{ends_with_terminal_punctuation, sentences, words};

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or",
    "other", "our", "ours", "out", "over", "own", "said", "same", "says", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "theirs", "them", "then", "there", "these",
    "they", "this", "those", "through", "to", "too", "under", "until", "up", "very", "was",
    "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "would", "you", "your", "yours",
];

/// Turns one segment into a `SegmentResult` using a classification gateway.
#[derive(Clone, Debug)]
pub struct SegmentProcessor {
    keyword_limit: usize,
    stopwords: HashSet<&'static str>,
}

impl Default for SegmentProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORD_LIMIT)
    }
}

impl SegmentProcessor {
    /// Create a processor keeping up to `keyword_limit` keywords per segment.
    pub fn new(keyword_limit: usize) -> Self {
        Self {
            keyword_limit,
            stopwords: STOPWORDS.iter().copied().collect(),
        }
    }

    /// Process `segment` for `symbol`.
    ///
    /// `Transient` and `Unknown` gateway failures are returned to the caller.
    /// An empty vocabulary, whether detected here or reported by the gateway,
    /// yields a zero-confidence neutral result instead of an error.
    pub fn process<G>(
        &self,
        segment: &Segment,
        symbol: &str,
        gateway: &G,
    ) -> Result<SegmentResult, GatewayError>
    where
        G: ClassificationGateway + ?Sized,
    {
        let word_count = words(&segment.text).len();
        let whitespace_tokens = segment.text.split_whitespace().count();
        let shape = classify_shape(&segment.text, word_count);
        let terms = self.content_terms(&segment.text);

        let skipped = |n_grams: usize, keywords: Vec<Keyword>| SegmentResult {
            ordinal: segment.ordinal,
            symbol: symbol.to_string(),
            n_grams,
            token_count: whitespace_tokens,
            word_count,
            char_len: segment.char_len,
            sentiment_label: SentimentLabel::Neutral,
            sentiment_score: EMPTY_VOCABULARY_SCORE,
            truncation_state: segment.state,
            shape,
            outcome: SegmentOutcome::EmptyVocabulary,
            keywords,
        };

        if terms.is_empty() {
            return Ok(skipped(0, Vec::new()));
        }
        let n_grams = count_n_grams(&terms);
        let keywords = self.keywords(&terms);

        match gateway.classify(&segment.text) {
            Ok(classification) => Ok(SegmentResult {
                ordinal: segment.ordinal,
                symbol: symbol.to_string(),
                n_grams,
                token_count: classification.token_count.unwrap_or(whitespace_tokens),
                word_count,
                char_len: segment.char_len,
                sentiment_label: classification.label,
                sentiment_score: classification.score,
                truncation_state: segment.state,
                shape,
                outcome: SegmentOutcome::Classified,
                keywords,
            }),
            Err(GatewayError::EmptyVocabulary) => Ok(skipped(n_grams, keywords)),
            Err(err) => Err(err),
        }
    }

    /// Lowercased words left after dropping stopwords, numbers, and
    /// one-char fragments.
    pub fn content_terms(&self, text: &str) -> Vec<String> {
        words(text)
            .into_iter()
            .map(|word| {
                let mut lowered = word.to_lowercase();
                let stem_len = lowered
                    .strip_suffix("'s")
                    .or_else(|| lowered.strip_suffix("\u{2019}s"))
                    .map(str::len);
                if let Some(len) = stem_len {
                    lowered.truncate(len);
                }
                lowered
            })
            .filter(|term| {
                term.chars().count() >= MIN_TERM_CHARS
                    && !term.chars().all(|ch| ch.is_numeric())
                    && !self.stopwords.contains(term.as_str())
            })
            .collect()
    }

    fn keywords(&self, terms: &[String]) -> Vec<Keyword> {
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for term in terms {
            *counts.entry(term.as_str()).or_insert(0) += 1;
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(self.keyword_limit)
            .map(|(term, _)| term.to_string())
            .collect()
    }
}

/// Process one segment with a default `SegmentProcessor`.
pub fn process<G>(
    segment: &Segment,
    symbol: &str,
    gateway: &G,
) -> Result<SegmentResult, GatewayError>
where
    G: ClassificationGateway + ?Sized,
{
    SegmentProcessor::default().process(segment, symbol, gateway)
}

/// Sentence / paragraph / random shape of a piece of text.
pub fn classify_shape(text: &str, word_count: usize) -> ChunkShape {
    match sentences(text).len() {
        0 => ChunkShape::Random,
        1 if ends_with_terminal_punctuation(text) && word_count <= SENTENCE_MAX_WORDS => {
            ChunkShape::Sentence
        }
        1 => ChunkShape::Random,
        _ => ChunkShape::Paragraph,
    }
}

fn count_n_grams(terms: &[String]) -> usize {
    let unigrams: HashSet<&str> = terms.iter().map(String::as_str).collect();
    let bigrams: HashSet<(&str, &str)> = terms
        .windows(2)
        .map(|pair| (pair[0].as_str(), pair[1].as_str()))
        .collect();
    unigrams.len() + bigrams.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk;
    use crate::gateway::Classification;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        result: Result<Classification, GatewayError>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(result: Result<Classification, GatewayError>) -> Self {
            Self {
                result,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ClassificationGateway for Scripted {
        fn classify(&self, _text: &str) -> Result<Classification, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn positive(token_count: Option<usize>) -> Scripted {
        Scripted::new(Ok(Classification {
            label: SentimentLabel::Positive,
            score: 0.91,
            token_count,
        }))
    }

    fn single(text: &str) -> Segment {
        chunk(text, 512).remove(0)
    }

    #[test]
    fn classified_segment_carries_gateway_output_and_local_counts() {
        let segment = single("Apple beat earnings estimates. Apple shares rose 4%.");
        let gateway = positive(Some(14));
        let result = SegmentProcessor::new(3)
            .process(&segment, "AAPL", &gateway)
            .unwrap();

        assert_eq!(result.symbol, "AAPL");
        assert_eq!(result.ordinal, 0);
        assert_eq!(result.sentiment_label, SentimentLabel::Positive);
        assert!((result.sentiment_score - 0.91).abs() < 1e-12);
        assert_eq!(result.token_count, 14);
        assert_eq!(result.word_count, 8);
        assert_eq!(result.char_len, segment.char_len);
        assert_eq!(result.shape, ChunkShape::Paragraph);
        assert_eq!(result.outcome, SegmentOutcome::Classified);
        assert_eq!(result.keywords, vec!["apple", "beat", "earnings"]);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn token_count_falls_back_to_whitespace_split() {
        let segment = single("Guidance raised for fiscal 2025.");
        let result = process(&segment, "MSFT", &positive(None)).unwrap();
        assert_eq!(result.token_count, 5);
        assert_eq!(result.shape, ChunkShape::Sentence);
    }

    #[test]
    fn empty_vocabulary_skips_the_gateway() {
        let segment = single("It is what it is, 100 of 200.");
        let gateway = positive(None);
        let result = process(&segment, "TSLA", &gateway).unwrap();
        assert_eq!(result.outcome, SegmentOutcome::EmptyVocabulary);
        assert_eq!(result.sentiment_label, SentimentLabel::Neutral);
        assert_eq!(result.sentiment_score, 0.0);
        assert_eq!(result.n_grams, 0);
        assert!(result.keywords.is_empty());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn gateway_empty_vocabulary_is_recorded_not_raised() {
        let segment = single("Quarterly dividend unchanged");
        let gateway = Scripted::new(Err(GatewayError::EmptyVocabulary));
        let result = process(&segment, "KO", &gateway).unwrap();
        assert_eq!(result.outcome, SegmentOutcome::EmptyVocabulary);
        assert_eq!(result.sentiment_score, 0.0);
        assert_eq!(result.n_grams, 5);
        assert_eq!(result.shape, ChunkShape::Random);
    }

    #[test]
    fn transient_and_unknown_failures_propagate() {
        let segment = single("Regulators opened an inquiry.");
        let transient = Scripted::new(Err(GatewayError::Transient("oom".into())));
        assert_eq!(
            process(&segment, "X", &transient),
            Err(GatewayError::Transient("oom".into()))
        );
        let unknown = Scripted::new(Err(GatewayError::Unknown("bad tensor".into())));
        assert_eq!(
            process(&segment, "X", &unknown),
            Err(GatewayError::Unknown("bad tensor".into()))
        );
    }

    #[test]
    fn content_terms_drop_noise_and_possessives() {
        let processor = SegmentProcessor::default();
        assert_eq!(
            processor.content_terms("The company's CEO said 2024 was a x record year"),
            vec!["company", "ceo", "record", "year"]
        );
    }

    #[test]
    fn n_grams_count_distinct_unigrams_and_bigrams() {
        let terms: Vec<String> = ["rate", "cut", "rate", "cut"]
            .iter()
            .map(|term| term.to_string())
            .collect();
        // unigrams {rate, cut}, bigrams {(rate,cut), (cut,rate)}
        assert_eq!(count_n_grams(&terms), 4);
    }

    #[test]
    fn shape_heuristics() {
        assert_eq!(classify_shape("Shares rose.", 2), ChunkShape::Sentence);
        assert_eq!(
            classify_shape("Shares rose. Bonds fell.", 4),
            ChunkShape::Paragraph
        );
        assert_eq!(classify_shape("Markets Today", 2), ChunkShape::Random);
        assert_eq!(classify_shape("Long sentence.", 41), ChunkShape::Random);
        assert_eq!(classify_shape("", 0), ChunkShape::Random);
    }
}
