//! The middleware chain.
//!
//! A request walks an ordered list of [`MiddlewareHandler`]s. Each one gets
//! the [`Context`] and a [`Next`] for the remainder of the list, and either
//! answers on its own or awaits `next.run(ctx)` and returns (possibly
//! decorates) what comes back. [`App`](crate::app::App) puts the router at
//! the end of the list.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Response, StatusCode, context::Context};

pub mod cache;

pub use cache::{CacheMiddleware, CacheRule};

/// Boxed future every middleware resolves to.
pub type BoxResponse = Pin<Box<dyn Future<Output = Response> + Send>>;

/// The rest of the chain for one request.
///
/// `run` takes `self`, so a layer can forward a request at most once. Running
/// past the last layer yields a `500`.
///
/// ```rust,no_run
/// use thunder::{context::Context, middleware::{BoxResponse, Middleware, Next}};
///
/// struct Tag;
///
/// impl Middleware for Tag {
///     fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
///         Box::pin(async move {
///             let mut response = next.run(ctx).await;
///             response.add_header("X-Served-By", "thunder");
///             response
///         })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    index: usize,
}

/// One link of the chain, shareable across connection tasks.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxResponse + Send + Sync + 'static>;

/// Erases a [`Middleware`] into a chain link.
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    pub fn new(middlewares: impl Into<Arc<[MiddlewareHandler]>>) -> Self {
        Self {
            middlewares: middlewares.into(),
            index: 0,
        }
    }

    pub async fn run(mut self, ctx: Context) -> Response {
        let Some(handler) = self.middlewares.get(self.index).cloned() else {
            tracing::error!(path = ctx.request().path(), "middleware chain ended without a response");
            return Response::new(StatusCode::InternalServerError);
        };
        self.index += 1;
        handler(ctx, self).await
    }
}

/// A layer of request handling.
///
/// Implementations are shared by every connection task: they must be
/// `Send + Sync`, and per-request state belongs in the returned future, not
/// in `&self`.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse;
}

/// One `info` event per request with method, path, status and latency.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request completed"
            );

            response
        })
    }
}
