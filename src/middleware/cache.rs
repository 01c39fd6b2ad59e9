//! POST response cache.
//!
//! For requests whose path matches a [`CacheRule`], the middleware derives a
//! key from the request URI and an MD5 digest of the body, then:
//!
//! - **hit**: answers `200 application/json` with the stored bytes; nothing
//!   downstream runs.
//! - **miss**: runs the rest of the chain, keeps a handle on the body it
//!   produced, and stores it when the status is `200` and the JSON `code`
//!   equals the success code.
//!
//! Caching is best-effort. A failed store read is a miss and a failed store
//! write is logged; neither changes what the client receives.
//!
//! Concurrent identical requests may both miss and both write. The writes
//! carry the same bytes, so the last one winning is harmless.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::{BoxResponse, Middleware, Next};
use crate::{
    Method, Request, Response, StatusCode,
    cache::{KeyBuilder, KvStore, cache_key},
    config::CacheConfig,
    context::Context,
    pattern::Glob,
};

/// One cacheable path pattern and the lifetime of entries it creates.
#[derive(Debug, Clone)]
pub struct CacheRule {
    glob: Glob,
    ttl: Duration,
}

impl CacheRule {
    pub fn new(pattern: &str, ttl: Duration) -> Result<Self, regex::Error> {
        Ok(Self {
            glob: Glob::new(pattern)?,
            ttl,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.glob.matches(path)
    }

    pub fn pattern(&self) -> &str {
        self.glob.as_str()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The TTL in whole seconds as handed to the store, rounded up so that a
    /// sub-second TTL still expires. Only [`Duration::ZERO`] maps to `0`,
    /// which stores without expiry.
    pub fn ttl_secs(&self) -> u64 {
        let secs = self.ttl.as_secs();
        if self.ttl.subsec_nanos() > 0 {
            secs.saturating_add(1)
        } else {
            secs
        }
    }
}

/// Response cache middleware. See the [module docs](self).
///
/// # Examples
///
/// ```rust,no_run
/// use std::{sync::Arc, time::Duration};
/// use thunder::cache::MemoryStore;
/// use thunder::middleware::{CacheMiddleware, CacheRule};
///
/// let rules = vec![CacheRule::new("/api/search/**", Duration::from_secs(60)).unwrap()];
/// let cache = CacheMiddleware::new(Arc::new(MemoryStore::new()), rules);
/// ```
pub struct CacheMiddleware {
    store: Arc<dyn KvStore>,
    rules: Arc<[CacheRule]>,
    success_code: i64,
    vary_headers: Arc<[String]>,
}

impl CacheMiddleware {
    pub fn new(store: Arc<dyn KvStore>, rules: Vec<CacheRule>) -> Self {
        Self {
            store,
            rules: rules.into(),
            success_code: crate::res::OK,
            vary_headers: Arc::from(Vec::new()),
        }
    }

    /// Builds the middleware from the `cache` configuration section.
    ///
    /// Every pattern gets the section's `expire`; patterns that fail to
    /// compile are logged and skipped.
    pub fn from_config(store: Arc<dyn KvStore>, config: &CacheConfig) -> Self {
        let ttl = Duration::from_secs(config.expire());
        let rules = crate::pattern::compile_all(&config.need_cache)
            .into_iter()
            .map(|glob| CacheRule { glob, ttl })
            .collect();
        Self {
            vary_headers: config.vary_headers.clone().into(),
            ..Self::new(store, rules)
        }
        .success_code(config.success_code())
    }

    /// Sets the JSON `code` value that marks a response as cacheable.
    #[must_use]
    pub fn success_code(mut self, code: i64) -> Self {
        self.success_code = code;
        self
    }

    /// Adds a request header whose value becomes part of the key digest.
    ///
    /// Without one, two users posting the same body to the same URI share an
    /// entry; naming `Authorization` here keeps their entries apart.
    #[must_use]
    pub fn vary_header(mut self, name: impl Into<String>) -> Self {
        let mut headers = self.vary_headers.to_vec();
        headers.push(name.into());
        self.vary_headers = headers.into();
        self
    }

    // First matching rule for a POST; everything else is not cacheable.
    fn rule_for(&self, request: &Request) -> Option<&CacheRule> {
        if request.method() != &Method::Post {
            return None;
        }
        self.rules.iter().find(|rule| rule.matches(request.path()))
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        let Some(rule) = self.rule_for(ctx.request()).cloned() else {
            return Box::pin(next.run(ctx));
        };
        let store = Arc::clone(&self.store);
        let vary_headers = Arc::clone(&self.vary_headers);
        let success_code = self.success_code;

        Box::pin(async move {
            let start = Instant::now();

            let body = match ctx.request().read_body() {
                Ok(body) => body,
                Err(e) => {
                    error!(path = ctx.request().path(), error = %e, "cannot read request body");
                    return Response::new(StatusCode::InternalServerError);
                }
            };
            let key = request_key(ctx.request(), &body, &vary_headers);

            match store.get(&key).await {
                Ok(cached) if !cached.is_empty() => {
                    debug!(%key, elapsed = ?start.elapsed(), "cache hit");
                    return Response::new(StatusCode::Ok)
                        .header("Content-Type", "application/json")
                        .body(cached);
                }
                Ok(_) => debug!(%key, "cache miss"),
                Err(e) => warn!(%key, error = %e, "cache read failed, passing through"),
            }

            let response = next.run(ctx).await;

            // The response value is exactly what the server writes to the
            // socket, so a second handle on its body is the captured copy.
            let captured = response.body_ref().clone();
            if let Some(payload) = cacheable_payload(response.status(), &captured, success_code) {
                let ttl_secs = rule.ttl_secs();
                match store.set(&key, payload, ttl_secs).await {
                    Ok(()) => debug!(%key, ttl_secs, elapsed = ?start.elapsed(), "cache stored"),
                    Err(e) => error!(%key, error = %e, "cache write failed"),
                }
            }

            response
        })
    }
}

fn request_key(request: &Request, body: &Bytes, vary_headers: &[String]) -> String {
    if vary_headers.is_empty() {
        return cache_key(request.uri(), body);
    }
    vary_headers
        .iter()
        .fold(KeyBuilder::new(request.uri()).body(body), |key, name| {
            key.header(name, request.headers().get(name))
        })
        .finish()
}

// Returns the body as text when it should be stored.
fn cacheable_payload(status: StatusCode, body: &[u8], success_code: i64) -> Option<&str> {
    if status != StatusCode::Ok {
        return None;
    }
    let envelope: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "response is not JSON, not caching");
            return None;
        }
    };
    let Some(code) = envelope.as_object().and_then(|obj| obj.get("code")) else {
        debug!("response has no code field, not caching");
        return None;
    };
    match code.as_i64() {
        Some(code) if code == success_code => std::str::from_utf8(body).ok(),
        Some(_) => None,
        None => {
            debug!(%code, "response code is not an integer, not caching");
            None
        }
    }
}
