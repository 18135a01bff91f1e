/// Ticker or instrument symbol an article is filed under.
/// Examples: `AAPL`, `BRK.B`, `MSFT`
pub type Symbol = String;
/// Producer/version namespace that prefixes every store key.
/// Examples: `0001`, `0002`
pub type Namespace = String;
/// Lowercase hex SHA-256 digest of a canonical article URL.
/// Example: `3f0a…e91c` (64 hex chars)
pub type UrlHash = String;
/// Caller-facing article identifier (stable across runs).
/// Example: `3f0a9b1c22d4e5f6`
pub type ArticleId = String;
/// Fully rendered deep-cache key.
/// Example: `0001.AAPL.3f0a…e91c`
pub type StoreKey = String;
/// Zero-padded segment ordinal used as the per-record map key.
/// Examples: `0000000000`, `0000000017`
pub type OrdinalKey = String;
/// A keyword left over after stop-noise removal.
/// Examples: `earnings`, `guidance`
pub type Keyword = String;
/// Sentence text extracted from a segment.
/// Example: `Shares rose 3.5% after the call.`
pub type Sentence = String;
