//! Redis-backed [`KvStore`].

use std::{future::Future, pin::Pin, time::Duration};

use redis::{
    ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo,
    aio::MultiplexedConnection,
};
use tracing::debug;

use super::{CacheError, KvStore, StoreFuture};
use crate::config::RedisConfig;

const DEFAULT_PORT: u16 = 6379;

/// A [`KvStore`] over one multiplexed Redis connection.
///
/// The connection is cheap to clone and safe to share between tasks; every
/// operation clones it rather than locking.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Opens a connection described by the `redis` configuration section.
    ///
    /// # Errors
    ///
    /// [`CacheError::Address`] if `addr` is neither a valid URL nor `host[:port]`,
    /// [`CacheError::Redis`] if the server cannot be reached.
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let info = connection_info(config)?;
        let client = redis::Client::open(info).map_err(|e| address_error(config, e.to_string()))?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        debug!(addr = config.addr(), db = config.db(), "redis connected");
        Ok(Self::from_connection(conn))
    }

    /// Wraps an already established connection.
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

fn address_error(config: &RedisConfig, reason: String) -> CacheError {
    CacheError::Address {
        addr: config.addr().to_owned(),
        reason,
    }
}

// `addr` is either a full `redis://` URL, used as is, or `host[:port]`
// combined with the `password` and `db` settings. The password is passed
// through unparsed.
fn connection_info(config: &RedisConfig) -> Result<ConnectionInfo, CacheError> {
    let addr = config.addr();
    if addr.starts_with("redis://") || addr.starts_with("rediss://") {
        return addr
            .into_connection_info()
            .map_err(|e| address_error(config, e.to_string()));
    }

    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|e| address_error(config, format!("bad port: {e}")))?;
            (host, port)
        }
        None => (addr, DEFAULT_PORT),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(address_error(config, "missing host".to_owned()));
    }

    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host.to_owned(), port),
        redis: RedisConnectionInfo {
            db: config.db(),
            password: config
                .password()
                .filter(|p| !p.is_empty())
                .map(str::to_owned),
            ..RedisConnectionInfo::default()
        },
    })
}

// Redis reports -2 for a missing key and -1 for a key without expiry.
fn ttl_from_secs(secs: i64) -> Duration {
    u64::try_from(secs).map_or(Duration::ZERO, Duration::from_secs)
}

impl KvStore for RedisStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, String> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
            Ok(value.unwrap_or_default())
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str, ttl_secs: u64) -> StoreFuture<'a, ()> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if ttl_secs > 0 {
                cmd.arg("EX").arg(ttl_secs);
            }
            let _: () = cmd.query_async(&mut conn).await?;
            Ok(())
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let found: Result<i64, redis::RedisError> =
                redis::cmd("EXISTS").arg(key).query_async(&mut conn).await;
            matches!(found, Ok(1))
        })
    }

    fn ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Duration> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let secs: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
            Ok(ttl_from_secs(secs))
        })
    }

    fn get_with_ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, (String, Duration)> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let (value, secs): (Option<String>, i64) = redis::pipe()
                .atomic()
                .cmd("GET")
                .arg(key)
                .cmd("TTL")
                .arg(key)
                .query_async(&mut conn)
                .await?;
            match value {
                Some(value) => Ok((value, ttl_from_secs(secs))),
                None => Ok((String::new(), Duration::ZERO)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_config(addr: &str, password: Option<&str>, db: i64) -> RedisConfig {
        RedisConfig {
            addr: Some(addr.to_owned()),
            password: password.map(str::to_owned),
            db: Some(db),
        }
    }

    fn tcp(info: &ConnectionInfo) -> (&str, u16) {
        match &info.addr {
            ConnectionAddr::Tcp(host, port) => (host.as_str(), *port),
            other => panic!("expected a TCP address, got {other:?}"),
        }
    }

    #[test]
    fn bare_address_takes_db_and_password() {
        let info = connection_info(&redis_config("10.0.0.5:6380", Some("s3cret"), 2)).unwrap();
        assert_eq!(tcp(&info), ("10.0.0.5", 6380));
        assert_eq!(info.redis.db, 2);
        assert_eq!(info.redis.password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn password_is_taken_verbatim() {
        for password in ["p/ss", "p#ss", "p?ss", "p@ss:w%rd"] {
            let info = connection_info(&redis_config("cache:6379", Some(password), 0)).unwrap();
            assert_eq!(info.redis.password.as_deref(), Some(password));
        }
        let info = connection_info(&redis_config("cache:6379", Some(""), 0)).unwrap();
        assert_eq!(info.redis.password, None);
    }

    #[test]
    fn port_defaults_and_brackets_are_stripped() {
        let info = connection_info(&redis_config("cache", None, 0)).unwrap();
        assert_eq!(tcp(&info), ("cache", DEFAULT_PORT));
        let info = connection_info(&redis_config("[::1]:7000", None, 0)).unwrap();
        assert_eq!(tcp(&info), ("::1", 7000));
    }

    #[test]
    fn full_url_is_used_as_is() {
        let info = connection_info(&redis_config("redis://user:pw@host:6390/4", Some("x"), 0)).unwrap();
        assert_eq!(tcp(&info), ("host", 6390));
        assert_eq!(info.redis.db, 4);
        assert_eq!(info.redis.password.as_deref(), Some("pw"));
    }

    #[test]
    fn unusable_address_is_reported() {
        for addr in ["cache:port", ":6379", "redis://host:notaport"] {
            assert!(matches!(
                connection_info(&redis_config(addr, None, 0)),
                Err(CacheError::Address { .. })
            ));
        }
    }

    #[test]
    fn negative_ttls_read_as_zero() {
        assert_eq!(ttl_from_secs(-2), Duration::ZERO);
        assert_eq!(ttl_from_secs(-1), Duration::ZERO);
        assert_eq!(ttl_from_secs(42), Duration::from_secs(42));
    }

    // The tests below need a server: `REDIS_URL=redis://... cargo test -- --ignored`.
    // They default to database 15 of a local instance.

    async fn live_store() -> RedisStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".into());
        RedisStore::connect(&redis_config(&url, None, 0)).await.unwrap()
    }

    fn live_key(name: &str) -> String {
        format!("thunder-test:{name}:{}", std::process::id())
    }

    #[tokio::test]
    #[ignore = "needs a Redis server"]
    async fn live_missing_key_is_empty() {
        let store = live_store().await;
        let key = live_key("missing");

        assert_eq!(store.get(&key).await.unwrap(), "");
        assert!(!store.exists(&key).await);
        assert_eq!(store.ttl(&key).await.unwrap(), Duration::ZERO);
        assert_eq!(
            store.get_with_ttl(&key).await.unwrap(),
            (String::new(), Duration::ZERO)
        );
    }

    #[tokio::test]
    #[ignore = "needs a Redis server"]
    async fn live_set_with_expiry_and_overwrite() {
        let store = live_store().await;
        let key = live_key("set");

        store.set(&key, r#"{"code":0}"#, 30).await.unwrap();
        assert!(store.exists(&key).await);
        let (value, ttl) = store.get_with_ttl(&key).await.unwrap();
        assert_eq!(value, r#"{"code":0}"#);
        assert!(ttl > Duration::ZERO && ttl <= Duration::from_secs(30));

        store.set(&key, "second", 0).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), "second");
        assert_eq!(store.ttl(&key).await.unwrap(), Duration::ZERO);

        store.set(&key, "gone", 1).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a Redis server"]
    async fn live_entry_expires() {
        let store = live_store().await;
        let key = live_key("expiry");

        store.set(&key, "v", 1).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), "v");
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(store.get(&key).await.unwrap(), "");
        assert!(!store.exists(&key).await);
    }
}
