//! HS256 access tokens.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JwtConfig;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token")]
    Invalid,

    #[error("failed to sign token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub username: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
    /// Issue time, seconds since the Unix epoch.
    pub iat: u64,
}

/// An access token and the longer-lived token used to renew it.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs and verifies tokens with one shared secret.
///
/// Lifetimes for [`issue`](Self::issue) come from the `jwt` configuration
/// section (`expire`, `refresh`); [`new`](Self::new) uses its defaults.
#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        let defaults = JwtConfig::default();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl: defaults.expire(),
            refresh_ttl: defaults.refresh(),
        }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self {
            access_ttl: config.expire(),
            refresh_ttl: config.refresh(),
            ..Self::new(config.secret())
        }
    }

    /// Issues an access and a refresh token with the configured lifetimes.
    pub fn issue(&self, user_id: &str, username: &str) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access_token: self.generate(user_id, username, self.access_ttl)?,
            refresh_token: self.generate(user_id, username, self.refresh_ttl)?,
        })
    }

    /// Issues a token for `user_id` that expires `ttl` from now.
    pub fn generate(&self, user_id: &str, username: &str, ttl: Duration) -> Result<String, JwtError> {
        let iat = unix_now();
        self.sign(&Claims {
            user_id: user_id.to_owned(),
            username: username.to_owned(),
            exp: iat + ttl.as_secs(),
            iat,
        })
    }

    /// Verifies the signature and expiry of `token`.
    pub fn parse(&self, token: &str) -> Result<Claims, JwtError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid,
            })
    }

    fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(JwtError::Encode)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_round_trips_claims() {
        let jwt = JwtService::new("secret");
        let token = jwt.generate("42", "ada", Duration::from_secs(60)).unwrap();
        let claims = jwt.parse(&token).unwrap();
        assert_eq!(claims.user_id, "42");
        assert_eq!(claims.username, "ada");
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn issued_pair_uses_configured_lifetimes() {
        let config = JwtConfig {
            secret: Some("secret".into()),
            expire: Some(900),
            refresh: Some(3600),
        };
        let jwt = JwtService::from_config(&config);
        let pair = jwt.issue("42", "ada").unwrap();

        let access = jwt.parse(&pair.access_token).unwrap();
        let refresh = jwt.parse(&pair.refresh_token).unwrap();
        assert_eq!(access.exp - access.iat, 900);
        assert_eq!(refresh.exp - refresh.iat, 3600);
        assert_eq!(refresh.user_id, "42");

        let defaults = JwtService::new("secret").issue("42", "ada").unwrap();
        let claims = jwt.parse(&defaults.access_token).unwrap();
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn expired_token_is_reported_as_such() {
        let jwt = JwtService::new("secret");
        let now = unix_now();
        let token = jwt
            .sign(&Claims {
                user_id: "42".into(),
                username: "ada".into(),
                exp: now - 10,
                iat: now - 70,
            })
            .unwrap();
        assert!(matches!(jwt.parse(&token), Err(JwtError::Expired)));
    }

    #[test]
    fn foreign_signature_is_invalid() {
        let token = JwtService::new("one")
            .generate("42", "ada", Duration::from_secs(60))
            .unwrap();
        assert!(matches!(
            JwtService::new("two").parse(&token),
            Err(JwtError::Invalid)
        ));
        assert!(matches!(
            JwtService::new("one").parse("not.a.token"),
            Err(JwtError::Invalid)
        ));
    }
}
