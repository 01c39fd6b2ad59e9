//! Search endpoint behind the response cache.
//!
//! ```text
//! cargo run --example cached_search -- thunder.toml
//! curl -XPOST localhost:8080/api/search/docs -d '{"q":"foo"}'
//! curl -XPOST localhost:8080/api/login -d '{"username":"ada"}'
//! ```
//!
//! Uses Redis at `redis.addr` when reachable, an in-process store otherwise.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thunder::{
    App, Router,
    cache::{KvStore, MemoryStore, RedisStore},
    config::Config,
    context::Context,
    res::{self, ApiError},
    security::JwtService,
};

#[derive(Deserialize)]
struct Query {
    q: String,
}

#[derive(Deserialize)]
struct Login {
    username: String,
}

async fn search(ctx: Context) -> thunder::Response {
    let kind = ctx.params().get("kind").unwrap_or("all").to_owned();
    let query: Query = match ctx.json() {
        Ok(query) => query,
        Err(e) => return res::fail(&ApiError::new(400, format!("bad query: {e}"))),
    };

    // Stand-in for a slow backend.
    tokio::time::sleep(Duration::from_millis(200)).await;
    res::success(vec![format!("{kind}:{}", query.q)])
}

// No password check: any username gets a token pair.
fn login(jwt: &JwtService, ctx: &Context) -> thunder::Response {
    let login: Login = match ctx.json() {
        Ok(login) => login,
        Err(e) => return res::fail(&ApiError::new(400, format!("bad login: {e}"))),
    };
    match jwt.issue(&login.username, &login.username) {
        Ok(pair) => res::success(pair),
        Err(e) => res::fail(&ApiError::new(500, e.to_string())),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1);
    let mut config = Config::load(path.as_deref())?;
    if config.cache.need_cache.is_empty() {
        config.cache.need_cache.push("/api/search/**".to_owned());
    }
    thunder::logs::init(&config.log);

    let store: Arc<dyn KvStore> = match RedisStore::connect(&config.redis).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "redis unavailable, caching in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let jwt = Arc::new(JwtService::from_config(&config.jwt));
    let mut router = Router::new();
    router.post("/api/search/:kind", search);
    router.post("/api/login", move |ctx: Context| {
        let jwt = Arc::clone(&jwt);
        async move { login(&jwt, &ctx) }
    });

    App::from_config(&config, store, router)
        .serve(&config.server)
        .await?;
    Ok(())
}
