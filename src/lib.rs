//! # thunder
//!
//! An async HTTP/1.1 toolkit with a Redis-backed response cache.
//!
//! POST endpoints that are expensive but deterministic (search, listings)
//! are cached per URI and request body: the first successful JSON response
//! is stored under `CACHE:<uri>:<md5(body)>` and replayed until it expires.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use thunder::{App, Router, cache::RedisStore, config::Config, context::Context, res};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Some("thunder.toml"))?;
//!     thunder::logs::init(&config.log);
//!
//!     let store = RedisStore::connect(&config.redis).await?;
//!     let mut router = Router::new();
//!     router.post("/api/search/:kind", |_ctx: Context| async { res::success(["hit"]) });
//!
//!     App::from_config(&config, Arc::new(store), router)
//!         .serve(&config.server)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod cache;
pub mod config;
pub mod context;
pub mod http;
pub mod logs;
pub mod middleware;
pub mod pattern;
pub mod res;
pub mod router;
pub mod security;
pub mod server;

pub use app::App;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
