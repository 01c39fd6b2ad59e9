//! Security middleware and token handling.
//!
//! - [`CorsMiddleware`]: origin allow-list, preflight answers and
//!   `Access-Control-*` response headers.
//! - [`JwtService`]: HS256 token issue and verification.
//! - [`AuthMiddleware`]: bearer-token check that records a [`UserId`]
//!   for downstream handlers.

pub mod auth;
pub mod cors;
pub mod jwt;

pub use auth::{AuthMiddleware, UserId};
pub use cors::CorsMiddleware;
pub use jwt::{Claims, JwtError, JwtService, TokenPair};
