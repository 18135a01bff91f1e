use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, TryLockError};
use std::thread;
use std::time::Instant;

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, warn};

use crate::config::StoreOptions;
use crate::constants::coordinator::KEY_SEPARATOR;
use crate::constants::store::{
    BITCODE_PREFIX, DEFAULT_STORE_FILENAME, JSON_PREFIX, META_KEY, READER_POOL_CAP,
    RECORD_SCHEMA_VERSION, RECORD_VERSION, STORE_VERSION, WRITER_LOCK_POLL,
};
use crate::data::ArticleRecord;
use crate::errors::CacheError;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS deep_cache (
    key TEXT PRIMARY KEY NOT NULL,
    payload BLOB NOT NULL,
    written_at INTEGER NOT NULL
)";
const SELECT_PAYLOAD_SQL: &str = "SELECT payload FROM deep_cache WHERE key = ?1";
const UPSERT_PAYLOAD_SQL: &str = "INSERT INTO deep_cache (key, payload, written_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, written_at = excluded.written_at";
const COUNT_RECORDS_SQL: &str = "SELECT COUNT(*) FROM deep_cache";
const CREATE_META_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS deep_cache_meta (
    name TEXT PRIMARY KEY NOT NULL,
    payload BLOB NOT NULL
)";
const SELECT_META_SQL: &str = "SELECT payload FROM deep_cache_meta WHERE name = ?1";
const UPSERT_META_SQL: &str = "INSERT INTO deep_cache_meta (name, payload) VALUES (?1, ?2)
    ON CONFLICT(name) DO UPDATE SET payload = excluded.payload";

/// Content-addressed persistence for article records.
///
/// Implementations must let readers proceed while a write is in flight and
/// must never expose a partially written record.
pub trait DeepCacheStore: Send + Sync {
    /// Look up `key`. Absent keys are `Miss`; undecodable or inconsistent
    /// payloads are `Corrupt`; an unreachable backend is `StoreUnavailable`.
    fn get(&self, key: &str) -> Result<ArticleRecord, CacheError>;
    /// Write `record` under `key`, replacing any previous record.
    fn put(&self, key: &str, record: &ArticleRecord) -> Result<(), CacheError>;
    /// `true` when a payload (valid or not) exists under `key`.
    fn contains(&self, key: &str) -> Result<bool, CacheError>;
    /// Number of stored article payloads.
    fn len(&self) -> Result<usize, CacheError>;
    /// `true` when no article payloads are stored.
    fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, bitcode::Encode, bitcode::Decode)]
/// Versioned metadata header stored in file-backed deep caches.
struct StoreMeta {
    version: u8,
    record_schema: u32,
}

impl StoreMeta {
    fn current() -> Self {
        Self {
            version: STORE_VERSION,
            record_schema: RECORD_SCHEMA_VERSION,
        }
    }
}

fn encode_store_meta(meta: &StoreMeta) -> Vec<u8> {
    encode_bitcode_payload(&bitcode::encode(meta))
}

fn decode_store_meta(bytes: &[u8]) -> Result<StoreMeta, CacheError> {
    let raw = decode_bitcode_payload(bytes)?;
    bitcode::decode(&raw).map_err(|err| CacheError::StoreUnavailable {
        reason: format!("failed to decode deep cache metadata: {err}"),
    })
}

fn encode_bitcode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn decode_bitcode_payload(bytes: &[u8]) -> Result<Vec<u8>, CacheError> {
    if bytes.first().copied() != Some(BITCODE_PREFIX) {
        return Err(CacheError::StoreUnavailable {
            reason: "bitcode payload missing expected prefix".into(),
        });
    }
    Ok(bytes[1..].to_vec())
}

/// Serialize `record` as `[RECORD_VERSION][JSON_PREFIX][json]`.
///
/// Records that violate their own invariants are refused so a partial or
/// inconsistent record never reaches the store.
pub fn encode_record(key: &str, record: &ArticleRecord) -> Result<Vec<u8>, CacheError> {
    let problems = record.invariant_violations();
    if !problems.is_empty() {
        return Err(corrupt(key, format!("refusing to write: {}", problems.join("; "))));
    }
    let json = serde_json::to_vec(record)
        .map_err(|err| corrupt(key, format!("failed to encode record: {err}")))?;
    let mut buf = Vec::with_capacity(2 + json.len());
    buf.push(RECORD_VERSION);
    buf.push(JSON_PREFIX);
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Decode and validate a payload read from `key`.
pub fn decode_record(key: &str, bytes: &[u8]) -> Result<ArticleRecord, CacheError> {
    match bytes {
        [] => return Err(corrupt(key, "empty payload")),
        [version, ..] if *version != RECORD_VERSION => {
            return Err(corrupt(
                key,
                format!("record version mismatch (expected {RECORD_VERSION}, found {version})"),
            ));
        }
        [_] => return Err(corrupt(key, "payload truncated after version tag")),
        [_, prefix, ..] if *prefix != JSON_PREFIX => {
            return Err(corrupt(key, "json payload missing expected prefix"));
        }
        _ => {}
    }

    let record: ArticleRecord = serde_json::from_slice(&bytes[2..])
        .map_err(|err| corrupt(key, format!("undecodable record: {err}")))?;
    if record.schema_version != RECORD_SCHEMA_VERSION {
        return Err(corrupt(
            key,
            format!(
                "record schema mismatch (expected {RECORD_SCHEMA_VERSION}, found {})",
                record.schema_version
            ),
        ));
    }
    let suffix = format!(
        "{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
        record.symbol, record.url_hash
    );
    if !key.ends_with(&suffix) {
        return Err(corrupt(key, "record does not belong to this key"));
    }
    let problems = record.invariant_violations();
    if !problems.is_empty() {
        return Err(corrupt(key, problems.join("; ")));
    }
    Ok(record)
}

fn corrupt(key: &str, reason: impl Into<String>) -> CacheError {
    CacheError::Corrupt {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn unavailable(reason: impl Into<String>) -> CacheError {
    CacheError::StoreUnavailable {
        reason: reason.into(),
    }
}

fn map_store_err(err: rusqlite::Error) -> CacheError {
    unavailable(err.to_string())
}

/// In-process deep cache for tests and ephemeral runs.
///
/// Stores encoded payloads, so reads go through the same codec and
/// validation as the file-backed store.
#[derive(Default)]
pub struct MemoryDeepCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl fmt::Debug for MemoryDeepCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read().map(|map| map.len()).unwrap_or(0);
        f.debug_struct("MemoryDeepCache")
            .field("entries", &entries)
            .finish()
    }
}

impl MemoryDeepCache {
    /// Create an empty in-memory cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes under `key`, bypassing the codec (repair/diagnostics).
    pub fn write_raw(&self, key: &str, payload: &[u8]) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| unavailable("memory deep cache poisoned"))?;
        entries.insert(key.to_string(), payload.to_vec());
        Ok(())
    }
}

impl DeepCacheStore for MemoryDeepCache {
    fn get(&self, key: &str) -> Result<ArticleRecord, CacheError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| unavailable("memory deep cache poisoned"))?;
        match entries.get(key) {
            Some(bytes) => decode_record(key, bytes),
            None => Err(CacheError::Miss),
        }
    }

    fn put(&self, key: &str, record: &ArticleRecord) -> Result<(), CacheError> {
        let payload = encode_record(key, record)?;
        self.write_raw(key, &payload)
    }

    fn contains(&self, key: &str) -> Result<bool, CacheError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| unavailable("memory deep cache poisoned"))?;
        Ok(entries.contains_key(key))
    }

    fn len(&self) -> Result<usize, CacheError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| unavailable("memory deep cache poisoned"))?;
        Ok(entries.len())
    }
}

/// File-backed deep cache on SQLite in WAL mode.
///
/// One writer connection behind a mutex serializes writers; each write is an
/// `IMMEDIATE` transaction. Readers use their own pooled read-only
/// connections and see the last committed snapshot, so they never wait on a
/// writer. The file is opened lazily, so constructing the store never fails;
/// open problems surface as `StoreUnavailable` from the first operation.
pub struct SqliteDeepCache {
    path: PathBuf,
    options: StoreOptions,
    writer: Mutex<Option<Connection>>,
    readers: Mutex<Vec<Connection>>,
    ready: AtomicBool,
}

impl fmt::Debug for SqliteDeepCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDeepCache")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("ready", &self.ready.load(Ordering::Acquire))
            .finish()
    }
}

impl SqliteDeepCache {
    /// Create a lazily-opened store at `path` (a directory gets the default
    /// filename appended).
    pub fn new<P: Into<PathBuf>>(path: P, options: StoreOptions) -> Self {
        Self {
            path: coerce_store_path(path.into()),
            options,
            writer: Mutex::new(None),
            readers: Mutex::new(Vec::new()),
            ready: AtomicBool::new(false),
        }
    }

    /// Create the store and open it immediately.
    pub fn open<P: Into<PathBuf>>(path: P, options: StoreOptions) -> Result<Self, CacheError> {
        let store = Self::new(path, options);
        let mut writer = store.lock_writer()?;
        store.ready_writer(&mut writer)?;
        drop(writer);
        Ok(store)
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store raw bytes under `key`, bypassing the codec (repair/diagnostics).
    pub fn write_raw(&self, key: &str, payload: &[u8]) -> Result<(), CacheError> {
        let mut writer = self.lock_writer()?;
        let conn = self.ready_writer(&mut writer)?;
        let result = write_payload(conn, key, payload);
        if result.is_err() {
            // Drop the connection; the next write reopens it.
            *writer = None;
        }
        result
    }

    fn ensure_ready(&self) -> Result<(), CacheError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut writer = self.lock_writer()?;
        self.ready_writer(&mut writer)?;
        Ok(())
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, Option<Connection>>, CacheError> {
        let deadline = Instant::now() + self.options.writer_lock_timeout;
        loop {
            match self.writer.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(unavailable(format!(
                            "timed out after {:?} waiting for the deep cache writer",
                            self.options.writer_lock_timeout
                        )));
                    }
                    thread::sleep(WRITER_LOCK_POLL);
                }
            }
        }
    }

    /// Open (if needed) and initialize the writer connection held in `slot`.
    fn ready_writer<'a>(
        &self,
        slot: &'a mut Option<Connection>,
    ) -> Result<&'a mut Connection, CacheError> {
        if slot.is_none() {
            ensure_parent_dir(&self.path)?;
            let conn = self.open_with_retry(
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            initialize_schema(&conn)?;
            verify_metadata(&conn)?;
            debug!(path = %self.path.display(), "opened deep cache writer");
            *slot = Some(conn);
            self.ready.store(true, Ordering::Release);
        }
        slot.as_mut()
            .ok_or_else(|| unavailable("deep cache writer connection missing"))
    }

    fn open_with_retry(&self, flags: OpenFlags) -> Result<Connection, CacheError> {
        let attempts = self.options.open_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.open_once(flags) {
                Ok(conn) => return Ok(conn),
                Err(err) => {
                    debug!(
                        path = %self.path.display(),
                        attempt,
                        attempts,
                        error = %err,
                        "deep cache open failed"
                    );
                    last_err = Some(err);
                    if attempt < attempts {
                        thread::sleep(self.options.retry_backoff);
                    }
                }
            }
        }
        Err(unavailable(format!(
            "failed to open {} after {attempts} attempt(s): {}",
            self.path.display(),
            last_err.map(|err| err.to_string()).unwrap_or_default()
        )))
    }

    fn open_once(&self, flags: OpenFlags) -> rusqlite::Result<Connection> {
        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.busy_timeout(self.options.busy_timeout)?;
        Ok(conn)
    }

    fn take_reader(&self) -> Result<Connection, CacheError> {
        let pooled = self
            .readers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => self.open_with_retry(
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
        }
    }

    fn return_reader(&self, conn: Connection) {
        let mut pool = self
            .readers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if pool.len() < READER_POOL_CAP {
            pool.push(conn);
        }
    }

    fn read_payload(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.ensure_ready()?;
        let conn = self.take_reader()?;
        let row = conn
            .query_row(SELECT_PAYLOAD_SQL, params![key], |row| row.get::<_, Vec<u8>>(0))
            .optional();
        match row {
            Ok(payload) => {
                self.return_reader(conn);
                Ok(payload)
            }
            // A failed reader is dropped rather than pooled.
            Err(err) => Err(map_store_err(err)),
        }
    }
}

impl DeepCacheStore for SqliteDeepCache {
    fn get(&self, key: &str) -> Result<ArticleRecord, CacheError> {
        match self.read_payload(key)? {
            Some(bytes) => decode_record(key, &bytes),
            None => Err(CacheError::Miss),
        }
    }

    fn put(&self, key: &str, record: &ArticleRecord) -> Result<(), CacheError> {
        let payload = encode_record(key, record)?;
        self.write_raw(key, &payload)
    }

    fn contains(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.read_payload(key)?.is_some())
    }

    fn len(&self) -> Result<usize, CacheError> {
        self.ensure_ready()?;
        let conn = self.take_reader()?;
        let count = conn
            .query_row(COUNT_RECORDS_SQL, [], |row| row.get::<_, i64>(0))
            .map_err(map_store_err)?;
        self.return_reader(conn);
        usize::try_from(count).map_err(|_| unavailable(format!("invalid record count {count}")))
    }
}

fn write_payload(conn: &mut Connection, key: &str, payload: &[u8]) -> Result<(), CacheError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(map_store_err)?;
    tx.execute(
        UPSERT_PAYLOAD_SQL,
        params![key, payload, Utc::now().timestamp_millis()],
    )
    .map_err(map_store_err)?;
    tx.commit().map_err(map_store_err)
}

fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(map_store_err)?;
    if !mode.eq_ignore_ascii_case("wal") {
        warn!(journal_mode = %mode, "deep cache could not enable WAL; readers may block on writers");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(map_store_err)?;
    conn.execute(CREATE_TABLE_SQL, []).map_err(map_store_err)?;
    conn.execute(CREATE_META_TABLE_SQL, [])
        .map_err(map_store_err)?;
    Ok(())
}

fn verify_metadata(conn: &Connection) -> Result<(), CacheError> {
    let existing = conn
        .query_row(SELECT_META_SQL, params![META_KEY], |row| row.get::<_, Vec<u8>>(0))
        .optional()
        .map_err(map_store_err)?;
    match existing {
        Some(bytes) => {
            let meta = decode_store_meta(&bytes)?;
            if meta.version != STORE_VERSION {
                return Err(unavailable(format!(
                    "deep cache version mismatch (expected {}, found {})",
                    STORE_VERSION, meta.version
                )));
            }
            if meta.record_schema != RECORD_SCHEMA_VERSION {
                return Err(unavailable(format!(
                    "deep cache record schema mismatch (expected {}, found {})",
                    RECORD_SCHEMA_VERSION, meta.record_schema
                )));
            }
        }
        None => write_store_meta(conn, &StoreMeta::current())?,
    }
    Ok(())
}

fn write_store_meta(conn: &Connection, meta: &StoreMeta) -> Result<(), CacheError> {
    conn.execute(UPSERT_META_SQL, params![META_KEY, encode_store_meta(meta)])
        .map_err(map_store_err)?;
    Ok(())
}

fn coerce_store_path(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        return path.join(DEFAULT_STORE_FILENAME);
    }
    path
}

fn ensure_parent_dir(path: &Path) -> Result<(), CacheError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|err| {
            unavailable(format!(
                "failed to create deep cache directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}
