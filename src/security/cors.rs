//! Cross-Origin Resource Sharing.

use crate::{
    Headers, Method, Response, StatusCode,
    config::ServerConfig,
    context::Context,
    middleware::{BoxResponse, Middleware, Next},
};

const ALLOW_METHODS: &str = "POST, GET, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, \
     Authorization, accept, origin, Cache-Control, X-Requested-With, Content-SessionType, Token";
const EXPOSE_HEADERS: &str = "Access-Control-Allow-Headers, Token";
const MAX_AGE: &str = "172800";

/// CORS middleware: resolves the `Origin` header against an allow-list,
/// answers preflight requests and decorates every other response with the
/// `Access-Control-*` headers.
///
/// Allow-list entries are one of:
///
/// | Entry               | Matches                        | Echoed origin   |
/// |---------------------|--------------------------------|-----------------|
/// | `*`                 | anything                       | `*`             |
/// | `https://a.com`     | exactly that origin            | the origin      |
/// | `*.example.com`     | any `<sub>.example.com` origin | the origin      |
///
/// A concrete (non-wildcard) origin also gets
/// `Access-Control-Allow-Credentials: true` and `Vary: Origin`. `OPTIONS`
/// requests are answered with `204 No Content`; the handler is not called.
///
/// ```rust
/// use thunder::security::CorsMiddleware;
///
/// let cors = CorsMiddleware::new(["https://app.example.com", "*.example.com"])
///     .allow_header("X-Trace-Id");
/// ```
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allow_headers: String,
}

impl CorsMiddleware {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: origins.into_iter().map(Into::into).collect(),
            allow_headers: ALLOW_HEADERS.to_owned(),
        }
    }

    /// Builds the allow-list from `server.cors`.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.cors.iter().cloned())
    }

    /// Appends a header name to `Access-Control-Allow-Headers`.
    #[must_use]
    pub fn allow_header(mut self, header: &str) -> Self {
        self.allow_headers.push_str(", ");
        self.allow_headers.push_str(header);
        self
    }

    /// The value to send back as `Access-Control-Allow-Origin`, if any.
    pub fn resolve_origin(&self, origin: &str) -> Option<String> {
        if self.allowed_origins.iter().any(|o| o == "*") {
            return Some("*".to_owned());
        }
        if self.allowed_origins.iter().any(|o| o == origin) {
            return Some(origin.to_owned());
        }
        self.allowed_origins
            .iter()
            .filter_map(|o| o.strip_prefix("*."))
            .any(|suffix| {
                origin
                    .strip_suffix(suffix)
                    .is_some_and(|head| head.ends_with('.'))
            })
            .then(|| origin.to_owned())
    }

    fn cors_headers(&self, allowed: Option<&str>) -> Headers {
        let mut headers = Headers::with_capacity(7);
        if let Some(origin) = allowed {
            headers.insert("Access-Control-Allow-Origin", origin);
            if origin != "*" {
                headers.insert("Access-Control-Allow-Credentials", "true");
                headers.insert("Vary", "Origin");
            }
        }
        headers.insert("Access-Control-Allow-Methods", ALLOW_METHODS);
        headers.insert("Access-Control-Allow-Headers", self.allow_headers.as_str());
        headers.insert("Access-Control-Expose-Headers", EXPOSE_HEADERS);
        headers.insert("Access-Control-Max-Age", MAX_AGE);
        headers
    }
}

fn apply(response: &mut Response, headers: &Headers) {
    for (name, value) in headers.iter() {
        response.add_header(name, value);
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        let origin = ctx.request().headers().get("origin").unwrap_or_default();
        let headers = self.cors_headers(self.resolve_origin(origin).as_deref());

        if ctx.request().method() == &Method::Options {
            let mut response = Response::new(StatusCode::NoContent);
            apply(&mut response, &headers);
            return Box::pin(async move { response });
        }

        Box::pin(async move {
            let mut response = next.run(ctx).await;
            apply(&mut response, &headers);
            response
        })
    }
}
