use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::constants::chunking::{DEFAULT_KEYWORD_LIMIT, DEFAULT_MAX_SEGMENT_CHARS};
use crate::constants::coordinator::{DEFAULT_NAMESPACE, KEY_SEPARATOR};
use crate::constants::gateway::DEFAULT_GATEWAY_SLOTS;
use crate::constants::store::{
    DEFAULT_BUSY_TIMEOUT, DEFAULT_OPEN_ATTEMPTS, DEFAULT_RETRY_BACKOFF, DEFAULT_STORE_DIR,
    DEFAULT_STORE_FILENAME, DEFAULT_WRITER_LOCK_TIMEOUT,
};
use crate::errors::PipelineError;
use crate::types::Namespace;

/// Bounds applied to every deep-cache store operation.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Attempts made to open the store before it is reported unavailable.
    pub open_attempts: u32,
    /// Pause between failed open attempts.
    pub retry_backoff: Duration,
    /// SQLite busy timeout for lock contention across processes.
    pub busy_timeout: Duration,
    /// Max wait for the in-process writer lock.
    pub writer_lock_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            open_attempts: DEFAULT_OPEN_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            writer_lock_timeout: DEFAULT_WRITER_LOCK_TIMEOUT,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Namespace prefixed to every store key.
    pub namespace: Namespace,
    /// Hard length budget per segment, in chars.
    pub max_segment_chars: usize,
    /// Worker threads used for segment and article processing.
    pub workers: usize,
    /// Concurrent `classify` calls admitted by the gateway pool.
    pub gateway_slots: usize,
    /// Keywords kept per segment after noise removal.
    pub keyword_limit: usize,
    /// Deep-cache store bounds.
    pub store: StoreOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_segment_chars: DEFAULT_MAX_SEGMENT_CHARS,
            workers: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            gateway_slots: DEFAULT_GATEWAY_SLOTS,
            keyword_limit: DEFAULT_KEYWORD_LIMIT,
            store: StoreOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Check the configuration, returning it unchanged when valid.
    pub fn validated(self) -> Result<Self, PipelineError> {
        if self.namespace.is_empty() || self.namespace.contains(KEY_SEPARATOR) {
            return Err(PipelineError::Configuration(format!(
                "namespace must be non-empty and must not contain '{KEY_SEPARATOR}' (got '{}')",
                self.namespace
            )));
        }
        if self.max_segment_chars == 0 {
            return Err(PipelineError::Configuration(
                "max_segment_chars must be > 0".into(),
            ));
        }
        if self.workers == 0 {
            return Err(PipelineError::Configuration("workers must be > 0".into()));
        }
        if self.gateway_slots == 0 {
            return Err(PipelineError::Configuration(
                "gateway_slots must be > 0".into(),
            ));
        }
        if self.store.open_attempts == 0 {
            return Err(PipelineError::Configuration(
                "store.open_attempts must be > 0".into(),
            ));
        }
        Ok(self)
    }
}

/// Default deep-cache file path under the crate's default store directory.
pub fn default_store_path() -> PathBuf {
    default_store_path_in_dir(DEFAULT_STORE_DIR)
}

/// Default deep-cache file path inside a custom directory.
pub fn default_store_path_in_dir<P: AsRef<std::path::Path>>(dir: P) -> PathBuf {
    dir.as_ref().join(DEFAULT_STORE_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default().validated().unwrap();
        assert_eq!(config.namespace, "0001");
        assert!(config.workers >= 1);
        assert_eq!(config.gateway_slots, 1);
    }

    #[test]
    fn validated_rejects_bad_values() {
        let cases = [
            PipelineConfig {
                namespace: "a.b".into(),
                ..PipelineConfig::default()
            },
            PipelineConfig {
                namespace: String::new(),
                ..PipelineConfig::default()
            },
            PipelineConfig {
                max_segment_chars: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                workers: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                gateway_slots: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                store: StoreOptions {
                    open_attempts: 0,
                    ..StoreOptions::default()
                },
                ..PipelineConfig::default()
            },
        ];
        for config in cases {
            assert!(matches!(
                config.validated(),
                Err(PipelineError::Configuration(_))
            ));
        }
    }

    #[test]
    fn default_paths_end_with_store_filename() {
        let path = default_store_path_in_dir("tmp-cache");
        assert_eq!(
            path.file_name().and_then(|name| name.to_str()),
            Some(DEFAULT_STORE_FILENAME)
        );
        assert!(default_store_path().starts_with(DEFAULT_STORE_DIR));
    }
}
