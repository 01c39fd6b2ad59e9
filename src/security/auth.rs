//! Bearer-token authentication.

use std::sync::Arc;

use serde_json::json;

use crate::{
    Response, StatusCode,
    config::AuthConfig,
    context::Context,
    middleware::{BoxResponse, Middleware, Next},
    pattern::{self, Glob},
};

use super::jwt::JwtService;

/// Authenticated user id, inserted into the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

/// Validates `Authorization: Bearer <token>` and records the caller.
///
/// - Paths matching an `ignores` glob are not inspected at all.
/// - A valid token puts a [`UserId`] in the request extensions.
/// - A missing or invalid token on a `need_logins` path still reaches the
///   handler, anonymously; anywhere else it is answered with `401` and
///   `{"error": "<reason>"}`.
///
/// A disabled middleware passes everything through.
pub struct AuthMiddleware {
    enabled: bool,
    jwt: Arc<JwtService>,
    ignores: Vec<Glob>,
    need_logins: Vec<Glob>,
}

impl AuthMiddleware {
    pub fn new(jwt: JwtService) -> Self {
        Self {
            enabled: true,
            jwt: Arc::new(jwt),
            ignores: Vec::new(),
            need_logins: Vec::new(),
        }
    }

    pub fn from_config(config: &AuthConfig, jwt: JwtService) -> Self {
        Self {
            enabled: config.enabled(),
            jwt: Arc::new(jwt),
            ignores: pattern::compile_all(&config.ignores),
            need_logins: pattern::compile_all(&config.need_logins),
        }
    }

    #[must_use]
    pub fn ignore(mut self, glob: Glob) -> Self {
        self.ignores.push(glob);
        self
    }

    #[must_use]
    pub fn optional(mut self, glob: Glob) -> Self {
        self.need_logins.push(glob);
        self
    }

    fn authenticate(&self, ctx: &Context) -> Result<UserId, &'static str> {
        let header = ctx
            .request()
            .headers()
            .get("authorization")
            .filter(|h| !h.is_empty())
            .ok_or("Authorization header is missing")?;
        let token = strip_bearer(header);
        self.jwt
            .parse(token)
            .map(|claims| UserId(claims.user_id))
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected bearer token");
                "Invalid token"
            })
    }
}

fn strip_bearer(header: &str) -> &str {
    match header.get(..7) {
        Some(prefix) if header.len() > 7 && prefix.eq_ignore_ascii_case("bearer ") => &header[7..],
        _ => header,
    }
}

impl Middleware for AuthMiddleware {
    fn handle(&self, mut ctx: Context, next: Next) -> BoxResponse {
        let path = ctx.request().path();
        if !self.enabled || pattern::any_match(&self.ignores, path) {
            return Box::pin(next.run(ctx));
        }

        match self.authenticate(&ctx) {
            Ok(user) => {
                ctx.extensions_mut().insert(user);
                Box::pin(next.run(ctx))
            }
            Err(_) if pattern::any_match(&self.need_logins, ctx.request().path()) => {
                Box::pin(next.run(ctx))
            }
            Err(reason) => {
                tracing::info!(path = ctx.request().path(), reason, "unauthorized request");
                let response = Response::json(StatusCode::Unauthorized, &json!({ "error": reason }));
                Box::pin(async move { response })
            }
        }
    }
}
