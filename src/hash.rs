//! Content addressing for article URLs.

use sha2::{Digest, Sha256};

use crate::types::UrlHash;

/// Canonical form of an article URL used for hashing.
///
/// Trims surrounding whitespace, lowercases the scheme and host, drops any
/// `#fragment`, and removes a single trailing `/` from the path.
pub fn canonical_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_fragment = match trimmed.find('#') {
        Some(pos) => &trimmed[..pos],
        None => trimmed,
    };

    let (scheme, rest) = match without_fragment.find("://") {
        Some(pos) => (
            Some(without_fragment[..pos].to_ascii_lowercase()),
            &without_fragment[pos + 3..],
        ),
        None => (None, without_fragment),
    };

    let host_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let host = rest[..host_end].to_ascii_lowercase();
    let mut tail = rest[host_end..].to_string();

    let path_end = tail.find('?').unwrap_or(tail.len());
    if path_end > 1 && tail[..path_end].ends_with('/') {
        tail.remove(path_end - 1);
    } else if path_end == 1 && tail.starts_with('/') {
        tail.remove(0);
    }

    match scheme {
        Some(scheme) => format!("{scheme}://{host}{tail}"),
        None => format!("{host}{tail}"),
    }
}

/// Lowercase hex SHA-256 of the canonical form of `url`.
pub fn url_hash(url: &str) -> UrlHash {
    let mut hasher = Sha256::new();
    hasher.update(canonical_url(url).as_bytes());
    hex::encode(hasher.finalize())
}

/// `true` when `value` looks like a `url_hash` (64 lowercase hex chars).
pub fn is_url_hash(value: &str) -> bool {
    value.len() == 64
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_normalizes_case_fragment_and_trailing_slash() {
        assert_eq!(
            canonical_url("  HTTPS://News.Example.com/markets/aapl/#comments "),
            "https://news.example.com/markets/aapl"
        );
        assert_eq!(
            canonical_url("https://news.example.com/"),
            "https://news.example.com"
        );
        assert_eq!(
            canonical_url("https://news.example.com/a/?id=7"),
            "https://news.example.com/a?id=7"
        );
    }

    #[test]
    fn canonical_url_keeps_path_case_and_query() {
        assert_eq!(
            canonical_url("https://EXAMPLE.com/Story?ID=Q3"),
            "https://example.com/Story?ID=Q3"
        );
    }

    #[test]
    fn url_hash_is_stable_and_ignores_cosmetic_differences() {
        let a = url_hash("https://news.example.com/markets/aapl");
        let b = url_hash("HTTPS://NEWS.example.com/markets/aapl/#top");
        assert_eq!(a, b);
        assert!(is_url_hash(&a));
        assert_ne!(a, url_hash("https://news.example.com/markets/msft"));
    }

    #[test]
    fn url_hash_matches_known_sha256() {
        // sha256("abc")
        assert_eq!(
            url_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn is_url_hash_rejects_wrong_shapes() {
        assert!(!is_url_hash("abc"));
        assert!(!is_url_hash(&"G".repeat(64)));
        assert!(!is_url_hash(&"A".repeat(64)));
    }
}
