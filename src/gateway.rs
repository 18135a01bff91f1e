//! Classification gateway interface and the bounded pool that fronts it.
//!
//! Ownership model:
//! - `ClassificationGateway` is the injected capability (a model, a remote
//!   service, or a test double). The core never constructs one itself.
//! - `GatewayPool` owns the gateway and admits at most `slots` concurrent
//!   `classify` calls, so the scarce model is never oversubscribed by the
//!   worker pool.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::data::SentimentLabel;
use crate::errors::GatewayError;
use crate::utils::words;

/// Output of a single `classify` call.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    /// Predicted sentiment.
    pub label: SentimentLabel,
    /// Confidence in `[0, 1]`.
    pub score: f64,
    /// Token count under the gateway's own tokenizer, when it exposes one.
    pub token_count: Option<usize>,
}

/// External sentiment-scoring capability.
pub trait ClassificationGateway: Send + Sync {
    /// Classify `text`, or report why it could not be classified.
    fn classify(&self, text: &str) -> Result<Classification, GatewayError>;
}

impl<G: ClassificationGateway + ?Sized> ClassificationGateway for Arc<G> {
    fn classify(&self, text: &str) -> Result<Classification, GatewayError> {
        (**self).classify(text)
    }
}

impl<G: ClassificationGateway + ?Sized> ClassificationGateway for Box<G> {
    fn classify(&self, text: &str) -> Result<Classification, GatewayError> {
        (**self).classify(text)
    }
}

/// Concurrency-bounded front for a `ClassificationGateway`.
pub struct GatewayPool {
    gateway: Arc<dyn ClassificationGateway>,
    slots: usize,
    in_flight: Mutex<usize>,
    released: Condvar,
    calls: AtomicUsize,
    peak: AtomicUsize,
}

impl GatewayPool {
    /// Wrap `gateway`, admitting at most `slots` concurrent calls (min 1).
    pub fn new(gateway: Arc<dyn ClassificationGateway>, slots: usize) -> Self {
        Self {
            gateway,
            slots: slots.max(1),
            in_flight: Mutex::new(0),
            released: Condvar::new(),
            calls: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Number of concurrent calls admitted.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Total `classify` calls forwarded to the gateway.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Highest number of simultaneous in-flight calls observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    fn acquire(&self) -> SlotGuard<'_> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while *in_flight >= self.slots {
            in_flight = self
                .released
                .wait(in_flight)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *in_flight += 1;
        self.peak.fetch_max(*in_flight, Ordering::Relaxed);
        SlotGuard { pool: self }
    }

    fn release(&self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *in_flight = in_flight.saturating_sub(1);
        drop(in_flight);
        self.released.notify_one();
    }
}

impl ClassificationGateway for GatewayPool {
    /// Classify through a pool slot, rejecting scores outside `[0, 1]`.
    fn classify(&self, text: &str) -> Result<Classification, GatewayError> {
        let _slot = self.acquire();
        self.calls.fetch_add(1, Ordering::Relaxed);
        let classification = self.gateway.classify(text)?;
        if !classification.score.is_finite() || !(0.0..=1.0).contains(&classification.score) {
            return Err(GatewayError::Unknown(format!(
                "gateway returned score {} outside [0, 1]",
                classification.score
            )));
        }
        Ok(classification)
    }
}

/// Releases a pool slot on drop, including on panic.
struct SlotGuard<'a> {
    pool: &'a GatewayPool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.pool.release();
    }
}

/// Word-list gateway for demos and offline runs.
///
/// Counts positive and negative cue words; the majority wins and the score is
/// the winning share of all cue hits. Text with no cues is neutral at 0.5.
#[derive(Clone, Debug)]
pub struct LexiconGateway {
    positive: HashSet<String>,
    negative: HashSet<String>,
}

const DEFAULT_POSITIVE_CUES: &[&str] = &[
    "beat", "beats", "bullish", "gain", "gains", "growth", "outperform", "profit", "rally",
    "rallied", "record", "rise", "rose", "strong", "surge", "surged", "upgrade", "upgraded",
];
const DEFAULT_NEGATIVE_CUES: &[&str] = &[
    "bearish", "decline", "declined", "downgrade", "downgraded", "fall", "fell", "lawsuit",
    "loss", "losses", "miss", "missed", "plunge", "plunged", "recall", "slump", "weak", "warning",
];

impl Default for LexiconGateway {
    fn default() -> Self {
        Self::new(
            DEFAULT_POSITIVE_CUES.iter().copied(),
            DEFAULT_NEGATIVE_CUES.iter().copied(),
        )
    }
}

impl LexiconGateway {
    /// Build a gateway from explicit cue lists (matched case-insensitively).
    pub fn new<P, N>(positive: P, negative: N) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        N: IntoIterator,
        N::Item: AsRef<str>,
    {
        Self {
            positive: positive
                .into_iter()
                .map(|cue| cue.as_ref().to_lowercase())
                .collect(),
            negative: negative
                .into_iter()
                .map(|cue| cue.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl ClassificationGateway for LexiconGateway {
    fn classify(&self, text: &str) -> Result<Classification, GatewayError> {
        let tokens = words(text);
        if tokens.is_empty() {
            return Err(GatewayError::EmptyVocabulary);
        }
        let (mut positive, mut negative) = (0usize, 0usize);
        for token in &tokens {
            let lowered = token.to_lowercase();
            if self.positive.contains(&lowered) {
                positive += 1;
            } else if self.negative.contains(&lowered) {
                negative += 1;
            }
        }
        let hits = positive + negative;
        let (label, score) = if positive > negative {
            (SentimentLabel::Positive, positive as f64 / hits as f64)
        } else if negative > positive {
            (SentimentLabel::Negative, negative as f64 / hits as f64)
        } else {
            (SentimentLabel::Neutral, 0.5)
        };
        Ok(Classification {
            label,
            score,
            token_count: Some(tokens.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    struct SlowGateway;

    impl ClassificationGateway for SlowGateway {
        fn classify(&self, _text: &str) -> Result<Classification, GatewayError> {
            thread::sleep(Duration::from_millis(5));
            Ok(Classification {
                label: SentimentLabel::Neutral,
                score: 0.5,
                token_count: None,
            })
        }
    }

    struct FixedScore(f64);

    impl ClassificationGateway for FixedScore {
        fn classify(&self, _text: &str) -> Result<Classification, GatewayError> {
            Ok(Classification {
                label: SentimentLabel::Positive,
                score: self.0,
                token_count: None,
            })
        }
    }

    #[test]
    fn pool_never_exceeds_its_slots() {
        let pool = Arc::new(GatewayPool::new(Arc::new(SlowGateway), 2));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.classify("text").unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.calls(), 8);
        assert!(pool.peak_in_flight() <= 2);
        assert!(pool.peak_in_flight() >= 1);
    }

    #[test]
    fn pool_rejects_out_of_range_scores() {
        for bad in [1.5, -0.1, f64::NAN] {
            let pool = GatewayPool::new(Arc::new(FixedScore(bad)), 1);
            assert!(matches!(
                pool.classify("text"),
                Err(GatewayError::Unknown(msg)) if msg.contains("outside")
            ));
        }
        let pool = GatewayPool::new(Arc::new(FixedScore(1.0)), 0);
        assert_eq!(pool.slots(), 1);
        assert!(pool.classify("text").is_ok());
    }

    #[test]
    fn lexicon_gateway_scores_by_cue_majority() {
        let gateway = LexiconGateway::default();
        let up = gateway.classify("Shares surged after a record quarter").unwrap();
        assert_eq!(up.label, SentimentLabel::Positive);
        assert!((up.score - 1.0).abs() < 1e-12);
        assert_eq!(up.token_count, Some(6));

        let down = gateway
            .classify("Stock fell on weak guidance despite strong sales")
            .unwrap();
        assert_eq!(down.label, SentimentLabel::Negative);
        assert!((down.score - 2.0 / 3.0).abs() < 1e-12);

        let flat = gateway.classify("The meeting is on Tuesday").unwrap();
        assert_eq!(flat.label, SentimentLabel::Neutral);
        assert_eq!(
            gateway.classify("... --"),
            Err(GatewayError::EmptyVocabulary)
        );
    }
}
