//! Application configuration.
//!
//! Every section is optional; accessor methods fill in defaults so callers
//! never look at raw `Option`s. Configuration is layered with the `config`
//! crate: an optional file (format chosen by extension) first, then
//! environment variables prefixed `THUNDER__`, e.g.
//! `THUNDER__REDIS__ADDR=cache:6379` or
//! `THUNDER__CACHE__NEED_CACHE=/api/search/**,/api/list/**`.
//!
//! ```toml
//! [server]
//! port = 8080
//! cors = ["https://app.example.com", "*.example.com"]
//!
//! [cache]
//! need_cache = ["/api/search/**"]
//! expire = 60
//!
//! [redis]
//! addr = "127.0.0.1:6379"
//! ```

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const ENV_PREFIX: &str = "THUNDER";
const DEFAULT_CACHE_EXPIRE_SECS: u64 = 5 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub jwt: JwtConfig,
    pub log: LogConfig,
}

impl Config {
    /// Loads configuration from `path` (if given and present) overlaid with
    /// `THUNDER__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path).required(false));
        }
        let built = builder.add_source(environment()).build()?;
        let cfg: Config = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses a TOML document, without environment overrides.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let built = ::config::Config::builder()
            .add_source(::config::File::from_str(
                source,
                ::config::FileFormat::Toml,
            ))
            .build()?;
        let cfg: Config = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.need_cache.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "cache.need_cache contains an empty pattern".into(),
            ));
        }
        if self.auth.enabled() && self.jwt.secret().is_empty() {
            return Err(ConfigError::Invalid(
                "auth is enabled but jwt.secret is not set".into(),
            ));
        }
        Ok(())
    }
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("cache.need_cache")
        .with_list_parse_key("cache.vary_headers")
        .with_list_parse_key("server.cors")
        .with_list_parse_key("auth.ignores")
        .with_list_parse_key("auth.need_logins")
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Allowed CORS origins: `*`, exact origins, or `*.domain` wildcards.
    pub cors: Vec<String>,
}

impl ServerConfig {
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or("0.0.0.0")
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(8080)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }
}

/// Response cache rules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path globs whose POST responses are cached, first match wins.
    pub need_cache: Vec<String>,
    /// Entry lifetime in seconds.
    pub expire: Option<u64>,
    /// Value of the JSON `code` field that marks a cacheable response.
    pub success_code: Option<i64>,
    /// Request headers folded into the key digest.
    pub vary_headers: Vec<String>,
}

impl CacheConfig {
    pub fn expire(&self) -> u64 {
        self.expire.unwrap_or(DEFAULT_CACHE_EXPIRE_SECS)
    }

    pub fn success_code(&self) -> i64 {
        self.success_code.unwrap_or(crate::res::OK)
    }

    pub fn is_enabled(&self) -> bool {
        !self.need_cache.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub addr: Option<String>,
    pub password: Option<String>,
    pub db: Option<i64>,
}

impl RedisConfig {
    pub fn addr(&self) -> &str {
        self.addr.as_deref().unwrap_or("127.0.0.1:6379")
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn db(&self) -> i64 {
        self.db.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: Option<bool>,
    /// Paths that skip token checks entirely.
    pub ignores: Vec<String>,
    /// Paths reachable anonymously when the token is missing or invalid.
    pub need_logins: Vec<String>,
}

impl AuthConfig {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: Option<String>,
    /// Access token lifetime in seconds.
    pub expire: Option<u64>,
    /// Refresh token lifetime in seconds.
    pub refresh: Option<u64>,
}

impl JwtConfig {
    pub fn secret(&self) -> &str {
        self.secret.as_deref().unwrap_or("")
    }

    pub fn expire(&self) -> Duration {
        Duration::from_secs(self.expire.unwrap_or(24 * 60 * 60))
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.refresh.unwrap_or(7 * 24 * 60 * 60))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: Option<String>,
    /// `json` or `text`.
    pub format: Option<String>,
    pub add_source: Option<bool>,
}

impl LogConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    pub fn format(&self) -> &str {
        self.format.as_deref().unwrap_or("json")
    }

    pub fn add_source(&self) -> bool {
        self.add_source.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.server.addr(), "0.0.0.0:8080");
        assert_eq!(cfg.cache.expire(), 300);
        assert_eq!(cfg.cache.success_code(), 0);
        assert!(!cfg.cache.is_enabled());
        assert_eq!(cfg.redis.addr(), "127.0.0.1:6379");
        assert!(!cfg.auth.enabled());
        assert_eq!(cfg.jwt.expire(), Duration::from_secs(86_400));
        assert_eq!(cfg.jwt.refresh(), Duration::from_secs(7 * 86_400));
        assert_eq!(cfg.log.format(), "json");
    }

    #[test]
    fn cache_rules_keep_order() {
        let cfg = Config::from_toml(
            r#"
            [cache]
            need_cache = ["/api/search/**", "/api/list/**"]
            expire = 60
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cache.need_cache, vec!["/api/search/**", "/api/list/**"]);
        assert_eq!(cfg.cache.expire(), 60);
    }

    #[test]
    fn empty_cache_pattern_is_rejected() {
        let err = Config::from_toml("[cache]\nneed_cache = [\"\"]").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn auth_requires_secret() {
        let err = Config::from_toml("[auth]\nenabled = true").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let cfg = Config::from_toml("[auth]\nenabled = true\n[jwt]\nsecret = \"k\"").unwrap();
        assert!(cfg.auth.enabled());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let cfg = Config::load(Some("/nonexistent/thunder-config")).unwrap();
        assert_eq!(cfg.server.port(), 8080);
    }
}
