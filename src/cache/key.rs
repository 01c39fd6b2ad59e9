//! Cache key derivation.
//!
//! Keys have the form `CACHE:<request-uri>:<hex md5>`; existing entries in a
//! shared store stay addressable only while this format is kept byte-for-byte.

use md5::{Digest, Md5};

const PREFIX: &str = "CACHE";

/// Key for a request with the given URI and body.
///
/// # Examples
///
/// ```
/// use thunder::cache::cache_key;
///
/// assert_eq!(
///     cache_key("/api/search/docs", br#"{"q":"foo"}"#),
///     "CACHE:/api/search/docs:c4888cfbe1d9b47ff3a0cc9519857621",
/// );
/// ```
pub fn cache_key(uri: &str, body: &[u8]) -> String {
    KeyBuilder::new(uri).body(body).finish()
}

/// Incremental key derivation for requests whose key also depends on
/// selected header values.
pub struct KeyBuilder<'a> {
    uri: &'a str,
    hasher: Md5,
}

impl<'a> KeyBuilder<'a> {
    pub fn new(uri: &'a str) -> Self {
        Self {
            uri,
            hasher: Md5::new(),
        }
    }

    #[must_use]
    pub fn body(mut self, body: &[u8]) -> Self {
        self.hasher.update(body);
        self
    }

    /// Folds a header into the digest. An absent header still contributes
    /// its name, so "missing" and "empty" hash differently.
    #[must_use]
    pub fn header(mut self, name: &str, value: Option<&str>) -> Self {
        self.hasher.update(b"\n");
        self.hasher.update(name.to_ascii_lowercase().as_bytes());
        match value {
            Some(v) => {
                self.hasher.update(b"=");
                self.hasher.update(v.as_bytes());
            }
            None => self.hasher.update(b"!"),
        }
        self
    }

    pub fn finish(self) -> String {
        format!("{PREFIX}:{}:{}", self.uri, hex::encode(self.hasher.finalize()))
    }
}
