/// Constants used by the chunker and segment processor.
pub mod chunking {
    /// Default maximum segment length in chars.
    pub const DEFAULT_MAX_SEGMENT_CHARS: usize = 512;
    /// Zero-padding width for ordinal map keys; wide enough for `u32::MAX`.
    pub const ORDINAL_KEY_WIDTH: usize = 10;
    /// Word ceiling for a segment to still count as a single sentence.
    pub const SENTENCE_MAX_WORDS: usize = 40;
    /// Default number of keywords kept per segment.
    pub const DEFAULT_KEYWORD_LIMIT: usize = 8;
    /// Minimum char length for a term to survive noise removal.
    pub const MIN_TERM_CHARS: usize = 2;
}

/// Constants used by the classification gateway pool.
pub mod gateway {
    /// Default number of concurrent `classify` calls admitted.
    pub const DEFAULT_GATEWAY_SLOTS: usize = 1;
    /// Score reported for segments skipped for an empty vocabulary.
    pub const EMPTY_VOCABULARY_SCORE: f64 = 0.0;
}

/// Constants used by the coordinator and article keys.
pub mod coordinator {
    /// Default store-key namespace.
    pub const DEFAULT_NAMESPACE: &str = "0001";
    /// Separator between namespace, symbol, and url hash in store keys.
    pub const KEY_SEPARATOR: char = '.';
    /// Hex chars of the url hash used as the default article id.
    pub const ARTICLE_ID_HEX_CHARS: usize = 16;
}

/// Constants used by deep-cache persistence and wire encoding.
pub mod store {
    use std::time::Duration;

    /// Version tag written before every persisted article record.
    pub const RECORD_VERSION: u8 = 1;
    /// Prefix marker for JSON-encoded record payloads.
    pub const JSON_PREFIX: u8 = b'J';
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
    /// Version tag for deep-cache metadata compatibility checks.
    pub const STORE_VERSION: u8 = 1;
    /// Schema version embedded in each `ArticleRecord`.
    pub const RECORD_SCHEMA_VERSION: u32 = 1;
    /// Row name of the store header in the metadata table.
    pub const META_KEY: &str = "__meta__";

    /// Default directory for persisted deep-cache files.
    pub const DEFAULT_STORE_DIR: &str = ".sentiment_cache";
    /// Default filename for persisted deep-cache files.
    pub const DEFAULT_STORE_FILENAME: &str = "deep_cache.sqlite3";

    /// Attempts made to open the store before reporting it unavailable.
    pub const DEFAULT_OPEN_ATTEMPTS: u32 = 3;
    /// Pause between failed open attempts.
    pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);
    /// SQLite busy timeout applied to every connection.
    pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(2);
    /// Max wait for the in-process writer lock.
    pub const DEFAULT_WRITER_LOCK_TIMEOUT: Duration = Duration::from_secs(2);
    /// Poll interval while waiting on the writer lock.
    pub const WRITER_LOCK_POLL: Duration = Duration::from_millis(2);
    /// Idle read connections retained for reuse.
    pub const READER_POOL_CAP: usize = 8;
}
