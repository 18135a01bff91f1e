use thiserror::Error;

use crate::types::{ArticleId, StoreKey};

/// Reasons the chunker produced no segments.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChunkerError {
    /// The text has no visible content.
    #[error("text is empty or whitespace-only; no classifiable content")]
    DegenerateInput,
    /// A chunker was requested with a zero length budget.
    #[error("max segment length must be > 0")]
    ZeroBudget,
}

/// Failures reported by a classification gateway for a single segment.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Model/runtime failure; the segment may be retried or skipped.
    #[error("transient classification failure: {0}")]
    Transient(String),
    /// Nothing classifiable left after noise removal.
    #[error("segment has an empty vocabulary after noise removal")]
    EmptyVocabulary,
    /// Anything else raised by the classifier.
    #[error("unknown classification failure: {0}")]
    Unknown(String),
}

/// Deep-cache lookup and write failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Nothing is stored under the key.
    #[error("no cached record")]
    Miss,
    /// A record exists but cannot be decoded.
    #[error("cached record '{key}' is corrupt: {reason}")]
    Corrupt {
        /// Key of the unreadable record.
        key: StoreKey,
        /// Decoder message.
        reason: String,
    },
    /// The store could not be opened, locked or queried.
    #[error("deep cache store unavailable: {reason}")]
    StoreUnavailable {
        /// Underlying storage error.
        reason: String,
    },
}

/// Request-level failures surfaced by the cache coordinator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A configuration value failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The article had segments but none of them classified.
    #[error("every segment of '{key}' failed classification ({failed} attempted): {last}")]
    AllSegmentsFailed {
        /// Store key of the article.
        key: StoreKey,
        /// Segments attempted.
        failed: usize,
        /// Error from the last failing segment.
        last: GatewayError,
    },
    /// The article's key parts cannot form a store key.
    #[error("article '{article_id}' rejected: {reason}")]
    InvalidArticle {
        /// Id of the rejected article.
        article_id: ArticleId,
        /// Which part was malformed.
        reason: String,
    },
    /// Chunker construction failed.
    #[error(transparent)]
    Chunker(#[from] ChunkerError),
    /// The worker thread pool could not be built.
    #[error("worker pool error: {0}")]
    WorkerPool(String),
}
