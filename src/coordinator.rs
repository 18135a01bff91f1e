//! Cache-first article pipeline.
//!
//! Each article moves through a small state machine:
//! lookup -> (hit) rehydrated, or lookup -> compute -> write-back -> computed.
//! Lookup failures of any kind fall through to compute; only an article whose
//! every segment failed classification is reported as an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, warn};

use crate::aggregate::{ArticlePipelineContext, aggregate_with_context};
use crate::chunker::Chunker;
use crate::config::PipelineConfig;
use crate::data::{ArticleInput, ArticleKey, ArticleRecord, SegmentResult};
use crate::errors::{CacheError, GatewayError, PipelineError};
use crate::gateway::{ClassificationGateway, GatewayPool};
use crate::hash::is_url_hash;
use crate::processor::SegmentProcessor;
use crate::store::DeepCacheStore;

/// Outcome of the write-back step after a computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteBack {
    /// The record was written to the store.
    Stored,
    /// The write failed; the computed record was still returned.
    Failed,
    /// The store was unavailable at lookup, so no write was attempted.
    Skipped,
}

/// Where a returned record came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RehydrationOrigin {
    /// Served from the deep cache with zero gateway calls.
    Rehydrated,
    /// Computed from text.
    Computed {
        /// What happened when the record was written back.
        write_back: WriteBack,
    },
}

/// A record plus how it was obtained.
#[derive(Clone, Debug, PartialEq)]
pub struct Rehydration {
    /// The article roll-up, identical whichever path produced it.
    pub record: ArticleRecord,
    /// Path taken through the coordinator.
    pub origin: RehydrationOrigin,
}

impl Rehydration {
    /// `true` when the record was served from the store.
    pub fn is_hit(&self) -> bool {
        self.origin == RehydrationOrigin::Rehydrated
    }
}

/// Snapshot of coordinator counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Lookups served from the store.
    pub hits: usize,
    /// Lookups that found no record.
    pub misses: usize,
    /// Lookups that found an undecodable record.
    pub corrupt: usize,
    /// Lookups that could not reach the store.
    pub unavailable: usize,
    /// Records computed from text (including ones that were not stored).
    pub computed: usize,
    /// Computed records the store refused.
    pub write_back_failures: usize,
}

#[derive(Default)]
struct StatCounters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    corrupt: AtomicUsize,
    unavailable: AtomicUsize,
    computed: AtomicUsize,
    write_back_failures: AtomicUsize,
}

impl StatCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CoordinatorStats {
        CoordinatorStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            computed: self.computed.load(Ordering::Relaxed),
            write_back_failures: self.write_back_failures.load(Ordering::Relaxed),
        }
    }
}

/// Serves article records from the deep cache, computing them on a miss.
pub struct CacheCoordinator {
    config: PipelineConfig,
    store: Arc<dyn DeepCacheStore>,
    gateway: GatewayPool,
    workers: ThreadPool,
    chunker: Chunker,
    processor: SegmentProcessor,
    stats: StatCounters,
}

impl CacheCoordinator {
    /// Build a coordinator over `store` and `gateway`.
    ///
    /// The configuration is validated; the worker pool and gateway slots are
    /// sized from it.
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn DeepCacheStore>,
        gateway: Arc<dyn ClassificationGateway>,
    ) -> Result<Self, PipelineError> {
        let config = config.validated()?;
        let chunker = Chunker::new(config.max_segment_chars)?;
        let workers = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|idx| format!("sentiment-worker-{idx}"))
            .build()
            .map_err(|err| PipelineError::WorkerPool(err.to_string()))?;
        Ok(Self {
            gateway: GatewayPool::new(gateway, config.gateway_slots),
            processor: SegmentProcessor::new(config.keyword_limit),
            chunker,
            workers,
            store,
            config,
            stats: StatCounters::default(),
        })
    }

    /// Active (validated) configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The bounded gateway front, for call accounting.
    pub fn gateway(&self) -> &GatewayPool {
        &self.gateway
    }

    /// Current counters.
    pub fn stats(&self) -> CoordinatorStats {
        self.stats.snapshot()
    }

    /// Return the record for `article`, from the store when possible.
    pub fn rehydrate(&self, article: &ArticleInput) -> Result<Rehydration, PipelineError> {
        check_article(article)?;
        let key = article.key(&self.config.namespace);
        let store_key = key.store_key();

        let write_back_allowed = match self.store.get(&store_key) {
            Ok(record) => {
                StatCounters::bump(&self.stats.hits);
                debug!(key = %store_key, chunk_count = record.chunk_count, "deep cache hit");
                return Ok(Rehydration {
                    record,
                    origin: RehydrationOrigin::Rehydrated,
                });
            }
            Err(CacheError::Miss) => {
                StatCounters::bump(&self.stats.misses);
                debug!(key = %store_key, "deep cache miss");
                true
            }
            Err(CacheError::Corrupt { key, reason }) => {
                StatCounters::bump(&self.stats.corrupt);
                warn!(key = %key, reason = %reason, "deep cache entry corrupt; recomputing");
                true
            }
            Err(CacheError::StoreUnavailable { reason }) => {
                StatCounters::bump(&self.stats.unavailable);
                warn!(
                    key = %store_key,
                    reason = %reason,
                    "deep cache unavailable; computing without write-back"
                );
                false
            }
        };

        let record = self.compute_for_key(key, article)?;
        let write_back = if !write_back_allowed {
            WriteBack::Skipped
        } else {
            match self.store.put(&store_key, &record) {
                Ok(()) => WriteBack::Stored,
                Err(err) => {
                    StatCounters::bump(&self.stats.write_back_failures);
                    warn!(
                        key = %store_key,
                        error = %err,
                        "deep cache write-back failed; serving computed record"
                    );
                    WriteBack::Failed
                }
            }
        };
        Ok(Rehydration {
            record,
            origin: RehydrationOrigin::Computed { write_back },
        })
    }

    /// Rehydrate several articles on the worker pool, preserving input order.
    pub fn rehydrate_many(
        &self,
        articles: &[ArticleInput],
    ) -> Vec<Result<Rehydration, PipelineError>> {
        self.workers.install(|| {
            articles
                .par_iter()
                .map(|article| self.rehydrate(article))
                .collect()
        })
    }

    /// Compute the record for `article` without touching the store.
    pub fn compute(&self, article: &ArticleInput) -> Result<ArticleRecord, PipelineError> {
        check_article(article)?;
        self.compute_for_key(article.key(&self.config.namespace), article)
    }

    fn compute_for_key(
        &self,
        key: ArticleKey,
        article: &ArticleInput,
    ) -> Result<ArticleRecord, PipelineError> {
        let mut context = ArticlePipelineContext::new(key, article.article_id.clone());
        let segments = self.chunker.chunk_paragraphs(&article.paragraphs);
        context.segments_attempted = segments.len();

        let outcomes: Vec<Result<SegmentResult, GatewayError>> = self.workers.install(|| {
            segments
                .par_iter()
                .map(|segment| {
                    self.processor
                        .process(segment, &article.symbol, &self.gateway)
                })
                .collect()
        });

        let mut results = Vec::with_capacity(outcomes.len());
        for (segment, outcome) in segments.iter().zip(outcomes) {
            match outcome {
                Ok(result) => results.push(result),
                Err(err) => {
                    match &err {
                        GatewayError::Transient(reason) => warn!(
                            key = %context.key,
                            ordinal = segment.ordinal,
                            reason = %reason,
                            "segment skipped after transient gateway failure"
                        ),
                        GatewayError::Unknown(_) | GatewayError::EmptyVocabulary => error!(
                            key = %context.key,
                            ordinal = segment.ordinal,
                            error = %err,
                            "segment failed classification"
                        ),
                    }
                    context.record_failure(err);
                }
            }
        }

        if context.all_failed() {
            let failed = context.failed_segments();
            let last = context
                .last_failure
                .take()
                .unwrap_or_else(|| GatewayError::Unknown("no failure recorded".into()));
            return Err(PipelineError::AllSegmentsFailed {
                key: context.store_key(),
                failed,
                last,
            });
        }

        let record = aggregate_with_context(&context, results);
        StatCounters::bump(&self.stats.computed);
        debug!(
            key = %context.key,
            chunk_count = record.chunk_count,
            failed = record.failed_segments,
            no_content = record.no_content,
            elapsed_ms = (Utc::now() - context.started_at).num_milliseconds(),
            "computed article record"
        );
        Ok(record)
    }
}

/// Reject inputs whose key parts would not form a well-formed store key.
fn check_article(article: &ArticleInput) -> Result<(), PipelineError> {
    let reason = if article.symbol.trim().is_empty() {
        "symbol is empty".to_string()
    } else if !is_url_hash(&article.url_hash) {
        format!(
            "url_hash '{}' is not a 64-char lowercase hex digest",
            article.url_hash
        )
    } else {
        return Ok(());
    };
    Err(PipelineError::InvalidArticle {
        article_id: article.article_id.clone(),
        reason,
    })
}
