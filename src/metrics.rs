use std::collections::HashMap;

use crate::data::ArticleRecord;
use crate::types::Symbol;

/// Sentiment roll-up across every article filed under one symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolSentiment {
    /// Symbol the articles are filed under.
    pub symbol: Symbol,
    /// Articles rolled up.
    pub articles: usize,
    /// Articles with no classifiable content.
    pub empty_articles: usize,
    /// Articles missing at least one failed segment.
    pub incomplete_articles: usize,
    /// Classified segments across all articles.
    pub chunk_count: usize,
    /// Segments labelled positive.
    pub positive_count: usize,
    /// Segments labelled neutral.
    pub neutral_count: usize,
    /// Segments labelled negative.
    pub negative_count: usize,
    /// Tokens across all classified segments.
    pub total_tokens: usize,
    /// `positive_count / chunk_count`; 0 with no chunks.
    pub positive_share: f64,
    /// `negative_count / chunk_count`; 0 with no chunks.
    pub negative_share: f64,
    /// `(positive - negative) / chunk_count`, in `[-1, 1]`; 0 with no chunks.
    pub net_score: f64,
}

impl SymbolSentiment {
    fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            articles: 0,
            empty_articles: 0,
            incomplete_articles: 0,
            chunk_count: 0,
            positive_count: 0,
            neutral_count: 0,
            negative_count: 0,
            total_tokens: 0,
            positive_share: 0.0,
            negative_share: 0.0,
            net_score: 0.0,
        }
    }

    fn absorb(&mut self, record: &ArticleRecord) {
        self.articles += 1;
        self.empty_articles += usize::from(record.no_content);
        self.incomplete_articles += usize::from(record.incomplete);
        self.chunk_count += record.chunk_count;
        self.positive_count += record.positive_count;
        self.neutral_count += record.neutral_count;
        self.negative_count += record.negative_count;
        self.total_tokens += record.total_tokens;
    }

    fn finish(mut self) -> Self {
        if self.chunk_count > 0 {
            let chunks = self.chunk_count as f64;
            self.positive_share = self.positive_count as f64 / chunks;
            self.negative_share = self.negative_count as f64 / chunks;
            self.net_score = (self.positive_count as f64 - self.negative_count as f64) / chunks;
        }
        self
    }
}

/// Roll article records up per symbol, sorted by symbol.
pub fn symbol_sentiment<'a, I>(records: I) -> Vec<SymbolSentiment>
where
    I: IntoIterator<Item = &'a ArticleRecord>,
{
    let mut by_symbol: HashMap<&str, SymbolSentiment> = HashMap::new();
    for record in records {
        by_symbol
            .entry(record.symbol.as_str())
            .or_insert_with(|| SymbolSentiment::empty(&record.symbol))
            .absorb(record);
    }
    let mut rollups: Vec<SymbolSentiment> = by_symbol
        .into_values()
        .map(SymbolSentiment::finish)
        .collect();
    rollups.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    rollups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::data::{
        ChunkShape, SegmentOutcome, SegmentResult, SentimentLabel, TruncationState,
    };

    fn record(symbol: &str, labels: &[SentimentLabel]) -> ArticleRecord {
        let results = labels
            .iter()
            .enumerate()
            .map(|(ordinal, label)| SegmentResult {
                ordinal: ordinal as u32,
                symbol: symbol.to_string(),
                n_grams: 2,
                token_count: 5,
                word_count: 5,
                char_len: 30,
                sentiment_label: *label,
                sentiment_score: 0.8,
                truncation_state: TruncationState::Intact,
                shape: ChunkShape::Sentence,
                outcome: SegmentOutcome::Classified,
                keywords: Vec::new(),
            })
            .collect();
        aggregate(symbol, "hash", "id", results)
    }

    #[test]
    fn symbol_sentiment_reports_balance() {
        use SentimentLabel::*;
        let records = [
            record("MSFT", &[Positive, Negative]),
            record("AAPL", &[Positive, Positive, Neutral]),
            record("AAPL", &[Negative]),
        ];
        let rollups = symbol_sentiment(&records);
        assert_eq!(rollups.len(), 2);

        let aapl = &rollups[0];
        assert_eq!(aapl.symbol, "AAPL");
        assert_eq!(aapl.articles, 2);
        assert_eq!(aapl.chunk_count, 4);
        assert_eq!(aapl.total_tokens, 20);
        assert!((aapl.positive_share - 0.5).abs() < 1e-6);
        assert!((aapl.negative_share - 0.25).abs() < 1e-6);
        assert!((aapl.net_score - 0.25).abs() < 1e-6);

        let msft = &rollups[1];
        assert_eq!(msft.symbol, "MSFT");
        assert!(msft.net_score.abs() < 1e-6);
    }

    #[test]
    fn empty_articles_do_not_divide_by_zero() {
        let rollups = symbol_sentiment(&[record("TSLA", &[])]);
        assert_eq!(rollups[0].empty_articles, 1);
        assert_eq!(rollups[0].chunk_count, 0);
        assert_eq!(rollups[0].net_score, 0.0);
        let none: Vec<ArticleRecord> = Vec::new();
        assert!(symbol_sentiment(&none).is_empty());
    }
}
