//! Application assembly: a middleware chain in front of a [`Router`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use thunder::{App, Router, cache::MemoryStore, config::Config, context::Context, res};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(Some("thunder.toml"))?;
//! let mut router = Router::new();
//! router.post("/api/search/:kind", |_ctx: Context| async { res::success(vec!["a", "b"]) });
//!
//! App::from_config(&config, Arc::new(MemoryStore::new()), router)
//!     .serve(&config.server)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::{future::Future, sync::Arc};

use crate::{
    Request, Response, Router,
    cache::KvStore,
    config::{Config, ServerConfig},
    context::Context,
    middleware::{
        BoxResponse, CacheMiddleware, LoggerMiddleware, Middleware, MiddlewareHandler, Next,
        from_middleware,
    },
    security::{AuthMiddleware, CorsMiddleware, JwtService},
    server::{Server, ServerError},
};

/// Middleware in registration order, then the router.
///
/// Cloning is cheap; clones share the chain.
#[derive(Clone)]
pub struct App {
    layers: Vec<MiddlewareHandler>,
    router: Arc<Router>,
    chain: Arc<[MiddlewareHandler]>,
}

impl App {
    pub fn new(router: Router) -> Self {
        let router = Arc::new(router);
        Self {
            chain: build_chain(&[], &router),
            layers: Vec::new(),
            router,
        }
    }

    /// Wires the standard stack from configuration:
    /// request logger, CORS (when origins are configured), auth (when
    /// enabled) and the response cache (when any pattern is configured).
    ///
    /// The cache sits after auth, so rejected requests never populate it.
    pub fn from_config(config: &Config, store: Arc<dyn KvStore>, router: Router) -> Self {
        let mut app = Self::new(router).wrap(LoggerMiddleware);
        if !config.server.cors.is_empty() {
            app = app.wrap(CorsMiddleware::from_config(&config.server));
        }
        if config.auth.enabled() {
            let jwt = JwtService::from_config(&config.jwt);
            app = app.wrap(AuthMiddleware::from_config(&config.auth, jwt));
        }
        if config.cache.is_enabled() {
            app = app.wrap(CacheMiddleware::from_config(store, &config.cache));
        }
        app
    }

    /// Appends `middleware`; it runs after every layer added before it.
    #[must_use]
    pub fn wrap<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.layers.push(from_middleware(Arc::new(middleware)));
        self.chain = build_chain(&self.layers, &self.router);
        self
    }

    /// Runs `request` through the chain. The future holds its own handle on
    /// the chain and does not borrow the app.
    pub fn handle(
        &self,
        request: Request,
    ) -> impl Future<Output = Response> + Send + 'static + use<> {
        let next = Next::new(Arc::clone(&self.chain));
        async move { next.run(Context::new(request)).await }
    }

    /// Binds `server.host:server.port` and serves until Ctrl-C.
    pub async fn serve(self, config: &ServerConfig) -> Result<(), ServerError> {
        self.serve_until(config, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
            }
        })
        .await
    }

    /// Binds `server.host:server.port` and serves until `shutdown` resolves.
    pub async fn serve_until<S>(self, config: &ServerConfig, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()>,
    {
        let server = Server::bind(config.addr()).await?;
        server
            .run_until(move |request| self.handle(request), shutdown)
            .await
    }
}

fn build_chain(layers: &[MiddlewareHandler], router: &Arc<Router>) -> Arc<[MiddlewareHandler]> {
    let router = Arc::clone(router);
    let terminal: MiddlewareHandler = Arc::new(move |ctx: Context, _next: Next| -> BoxResponse {
        let router = Arc::clone(&router);
        Box::pin(async move { router.dispatch(ctx).await })
    });
    layers.iter().cloned().chain([terminal]).collect()
}
