//! Key-value store adapters backing the response cache.
//!
//! [`KvStore`] is the seam between the cache middleware and the backend. Two
//! implementations ship with the crate:
//!
//! - [`RedisStore`]: a multiplexed async Redis connection, the production backend.
//! - [`MemoryStore`]: an in-process map with lazy expiry, for tests and
//!   single-process development.
//!
//! Absence is never an error: [`KvStore::get`] returns an empty string for a
//! missing key, mirroring how the middleware treats an empty value as a miss.

use std::{future::Future, pin::Pin, time::Duration};

use thiserror::Error;

pub mod key;
pub mod memory;
pub mod redis;

pub use self::key::{KeyBuilder, cache_key};
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors surfaced by a [`KvStore`] backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("invalid store address {addr:?}: {reason}")]
    Address { addr: String, reason: String },
}

/// Boxed future returned by fallible [`KvStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Uniform get/set/exists/ttl access to a remote key-value backend.
///
/// # Contract
///
/// - `get` on a missing key resolves to `Ok(String::new())`.
/// - `set` overwrites unconditionally; a `ttl_secs` of `0` stores without expiry.
/// - `exists` never fails: backend errors read as "does not exist".
/// - `ttl` and `get_with_ttl` report [`Duration::ZERO`] for a missing key or a
///   key without expiry.
/// - `get_with_ttl` reads value and TTL in one atomic round-trip.
pub trait KvStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, String>;

    fn set<'a>(&'a self, key: &'a str, value: &'a str, ttl_secs: u64) -> StoreFuture<'a, ()>;

    fn exists<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

    fn ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Duration>;

    fn get_with_ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, (String, Duration)>;
}
