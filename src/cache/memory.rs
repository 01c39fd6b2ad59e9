//! In-process [`KvStore`] with lazy expiry.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use tokio::time::Instant;

use super::{KvStore, StoreFuture};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// A [`KvStore`] kept in a mutex-guarded map.
///
/// Expired entries are dropped when they are next touched. Time comes from
/// [`tokio::time::Instant`], so tests running on a paused clock can step
/// past a TTL with `tokio::time::advance`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

impl KvStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, String> {
        let value = self.live(key).map(|e| e.value).unwrap_or_default();
        Box::pin(async move { Ok(value) })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str, ttl_secs: u64) -> StoreFuture<'a, ()> {
        let expires_at = (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs));
        self.lock().insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at,
            },
        );
        Box::pin(async { Ok(()) })
    }

    fn exists<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        let found = self.live(key).is_some();
        Box::pin(async move { found })
    }

    fn ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Duration> {
        let ttl = self.live(key).map_or(Duration::ZERO, |e| remaining(&e));
        Box::pin(async move { Ok(ttl) })
    }

    fn get_with_ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, (String, Duration)> {
        // One lookup under one lock, so value and TTL describe the same entry.
        let pair = self
            .live(key)
            .map_or((String::new(), Duration::ZERO), |e| {
                let ttl = remaining(&e);
                (e.value, ttl)
            });
        Box::pin(async move { Ok(pair) })
    }
}

fn remaining(entry: &Entry) -> Duration {
    entry
        .expires_at
        .map_or(Duration::ZERO, |at| at.saturating_duration_since(Instant::now()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_empty_not_error() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), "");
        assert!(!store.exists("nope").await);
        assert_eq!(
            store.get_with_ttl("nope").await.unwrap(),
            (String::new(), Duration::ZERO)
        );
    }

    #[tokio::test]
    async fn set_overwrites() {
        let store = MemoryStore::new();
        store.set("k", "one", 60).await.unwrap();
        store.set("k", "two", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), "two");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store.set("k", "v", 5).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        let (value, ttl) = store.get_with_ttl("k").await.unwrap();
        assert_eq!(value, "v");
        assert_eq!(ttl, Duration::from_secs(3));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(store.get("k").await.unwrap(), "");
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_never_expires() {
        let store = MemoryStore::new();
        store.set("k", "v", 0).await.unwrap();
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert!(store.exists("k").await);
        assert_eq!(store.ttl("k").await.unwrap(), Duration::ZERO);
    }
}
