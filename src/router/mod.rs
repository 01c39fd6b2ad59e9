//! Method + path routing, the terminal layer of an [`App`](crate::app::App).
//!
//! Route paths are split on `/`. A segment is a literal, a `:name`
//! capture of exactly one segment, or a final `*` that captures the rest of
//! the path (leading slash included) as `wildcard`:
//!
//! | Route               | Request path         | Params                    |
//! |---------------------|----------------------|---------------------------|
//! | `/health`           | `/health`            |                           |
//! | `/api/search/:kind` | `/api/search/docs`   | `kind = docs`             |
//! | `/static/*`         | `/static/css/a.css`  | `wildcard = /css/a.css`   |
//!
//! Empty segments are ignored on both sides, so trailing slashes do not
//! matter. Routes are tried in registration order.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{
    Method, Request, Response, StatusCode,
    context::{Context, PathParams},
};

/// A boxed route handler.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Anything callable as `async fn(Context) -> Response`.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(self(ctx))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
    Rest,
}

fn compile(pattern: &str) -> Vec<Segment> {
    let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let last = parts.len().saturating_sub(1);
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| match part.strip_prefix(':') {
            _ if *part == "*" && i == last => Segment::Rest,
            Some(name) => Segment::Param(name.to_owned()),
            None => Segment::Literal((*part).to_owned()),
        })
        .collect()
}

fn capture(segments: &[Segment], path: &str) -> Option<PathParams> {
    let mut params = PathParams::new();
    let mut rest = path;

    for segment in segments {
        let trimmed = rest.trim_start_matches('/');
        if *segment == Segment::Rest {
            params.insert("wildcard".to_owned(), rest.to_owned());
            return Some(params);
        }
        let head = trimmed.split('/').next().unwrap_or_default();
        match segment {
            Segment::Literal(literal) if literal == head => {}
            Segment::Param(name) if !head.is_empty() => {
                params.insert(name.clone(), head.to_owned());
            }
            _ => return None,
        }
        rest = &trimmed[head.len()..];
    }

    rest.trim_matches('/').is_empty().then_some(params)
}

struct Route {
    method: Method,
    segments: Vec<Segment>,
    handler: Handler,
}

/// Routes requests to handlers; unmatched requests get `404`.
///
/// ```rust,no_run
/// use thunder::{Router, context::Context, res};
///
/// let mut router = Router::new();
/// router.post("/api/search/:kind", |ctx: Context| async move {
///     let kind = ctx.params().get("kind").unwrap_or_default().to_owned();
///     res::success(kind)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add(Method::Get, path, handler);
    }

    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add(Method::Post, path, handler);
    }

    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add(Method::Put, path, handler);
    }

    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add(Method::Delete, path, handler);
    }

    fn add(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        self.routes.push(Route {
            method,
            segments: compile(path),
            handler: Arc::new(move |ctx| handler.call(ctx)),
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Runs the first matching handler.
    ///
    /// Extensions set by middleware survive; only the path parameters are
    /// replaced by the route's captures.
    pub async fn dispatch(&self, mut ctx: Context) -> Response {
        let matched = self.routes.iter().find_map(|route| {
            if &route.method != ctx.request().method() {
                return None;
            }
            capture(&route.segments, ctx.request().path()).map(|params| (&route.handler, params))
        });

        match matched {
            Some((handler, params)) => {
                ctx.set_params(params);
                handler(ctx).await
            }
            None => Response::new(StatusCode::NotFound),
        }
    }

    /// Dispatches a request that did not go through any middleware.
    pub async fn route(&self, request: Request) -> Response {
        self.dispatch(Context::new(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    fn params(pattern: &str, path: &str) -> Option<PathParams> {
        capture(&compile(pattern), path)
    }

    #[test]
    fn literal_routes_ignore_trailing_slashes() {
        assert!(params("/health/", "/health").is_some());
        assert!(params("/health", "/health/").is_some());
        assert!(params("/", "/").is_some());
        assert!(params("/health", "/healthz").is_none());
    }

    #[test]
    fn captures_need_exactly_one_segment() {
        let p = params("/api/search/:kind", "/api/search/docs").unwrap();
        assert_eq!(p.get("kind"), Some("docs"));
        assert!(params("/api/search/:kind", "/api/search").is_none());
        assert!(params("/api/search/:kind", "/api/search/docs/extra").is_none());
    }

    #[test]
    fn trailing_star_takes_the_rest() {
        let p = params("/static/*", "/static/css/a.css").unwrap();
        assert_eq!(p.get("wildcard"), Some("/css/a.css"));
        assert!(params("/static/*", "/other/a.css").is_none());
    }

    #[tokio::test]
    async fn method_must_match() {
        let mut router = Router::new();
        router.get("/hello", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        let res = router.route(request("POST", "/hello")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn first_registered_route_wins() {
        let mut router = Router::new();
        router.post("/api/:kind", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.post("/api/list", |_ctx: Context| async { Response::new(StatusCode::Accepted) });
        let res = router.route(request("POST", "/api/list")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(router.len(), 2);
    }

    #[tokio::test]
    async fn dispatch_keeps_upstream_extensions() {
        struct Marker(&'static str);

        let mut router = Router::new();
        router.put("/r/:id", |ctx: Context| async move {
            let marker = ctx.extensions().get::<Marker>().map_or("none", |m| m.0);
            let id = ctx.params().get("id").unwrap_or_default().to_owned();
            Response::new(StatusCode::Ok).body(format!("{marker}:{id}"))
        });

        let mut ctx = Context::new(request("PUT", "/r/9"));
        ctx.extensions_mut().insert(Marker("set"));
        let res = router.dispatch(ctx).await;
        assert_eq!(res.body_ref().as_ref(), b"set:9");
    }
}
