#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Folding segment results into article records.
pub mod aggregate;
/// Word-boundary chunking under a hard length budget.
pub mod chunker;
/// Pipeline and store configuration.
pub mod config;
/// Centralized constants used across chunking, gateway, and store code.
pub mod constants;
/// Cache-first article pipeline.
pub mod coordinator;
/// Article, segment, and record types.
pub mod data;
/// Reusable demo runners shared by binaries.
pub mod example_apps;
/// Classification gateway interface, pool, and lexicon gateway.
pub mod gateway;
/// URL canonicalization and content addressing.
pub mod hash;
/// Cross-article roll-ups.
pub mod metrics;
/// Per-segment counting, shape detection, and classification.
pub mod processor;
/// Deep cache persistence backends.
pub mod store;
/// Shared type aliases.
pub mod types;
/// Text normalization helpers.
pub mod utils;

mod errors;

pub use aggregate::{ArticlePipelineContext, aggregate, aggregate_with_context};
pub use chunker::{Chunker, chunk, reassemble};
pub use config::{PipelineConfig, StoreOptions};
pub use coordinator::{
    CacheCoordinator, CoordinatorStats, Rehydration, RehydrationOrigin, WriteBack,
};
pub use data::{
    ArticleInput, ArticleKey, ArticleRecord, ChunkShape, Segment, SegmentOutcome, SegmentResult,
    SentimentLabel, TruncationState,
};
pub use errors::{CacheError, ChunkerError, GatewayError, PipelineError};
pub use gateway::{Classification, ClassificationGateway, GatewayPool, LexiconGateway};
pub use metrics::{SymbolSentiment, symbol_sentiment};
pub use processor::{SegmentProcessor, process};
pub use store::{DeepCacheStore, MemoryDeepCache, SqliteDeepCache};
pub use types::{ArticleId, Keyword, Namespace, OrdinalKey, Sentence, StoreKey, Symbol, UrlHash};
