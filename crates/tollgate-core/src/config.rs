//! Tollgate configuration management
//!
//! Handles configuration from environment variables and TOML files with
//! sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Missing required setting: {0}")]
    Missing(String),
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment
    pub environment: Environment,

    /// Server configuration
    pub server: ServerConfig,

    /// Identity backend configuration
    pub identity: IdentityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,

    /// Client session timing
    pub session: SessionConfig,

    /// Role store and counter store connections
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(env) = std::env::var("TOLLGATE_ENV") {
            config.environment = env.parse()?;
        }

        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            config.server.host = host;
        }
        if let Some(port) = parse_env::<u16>("API_PORT")? {
            config.server.port = port;
        }

        // Identity backend
        if let Ok(provider) = std::env::var("IDENTITY_PROVIDER") {
            config.identity.provider = provider.parse()?;
        }
        if let Ok(url) = std::env::var("IDENTITY_URL") {
            config.identity.url = Some(url);
        }
        if let Ok(key) = std::env::var("IDENTITY_API_KEY") {
            config.identity.api_key = Some(key);
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            config.identity.jwt_secret = secret;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            config.identity.jwt_issuer = issuer;
        }
        if let Some(ttl) = parse_env("ACCESS_TOKEN_TTL_SECS")? {
            config.identity.access_token_ttl_secs = ttl;
        }
        if let Some(ttl) = parse_env("MFA_CHALLENGE_TTL_SECS")? {
            config.identity.mfa_challenge_ttl_secs = ttl;
        }
        if let Some(attempts) = parse_env("AUTH_MAX_LOGIN_ATTEMPTS")? {
            config.identity.max_failed_attempts = attempts;
        }
        if let Some(secs) = parse_env("AUTH_LOCKOUT_DURATION_SECS")? {
            config.identity.lockout_duration_secs = secs;
        }

        // Rate limiting
        if let Some(ms) = parse_env("RATE_LIMIT_WINDOW_MS")? {
            config.rate_limit.window_ms = ms;
        }
        if let Some(max) = parse_env("RATE_LIMIT_MAX")? {
            config.rate_limit.max = max;
        }
        if let Some(ms) = parse_env("AUTH_RATE_LIMIT_WINDOW_MS")? {
            config.rate_limit.auth_window_ms = ms;
        }
        if let Some(max) = parse_env("AUTH_RATE_LIMIT_MAX")? {
            config.rate_limit.auth_max = max;
        }

        // Session timing
        if let Some(secs) = parse_env("SESSION_REFRESH_THRESHOLD_SECS")? {
            config.session.refresh_threshold_secs = secs;
        }
        if let Some(secs) = parse_env("SESSION_IDLE_TIMEOUT_SECS")? {
            config.session.idle_timeout_secs = secs;
        }
        if let Some(secs) = parse_env("SESSION_ACTIVITY_CHECK_SECS")? {
            config.session.activity_check_secs = secs;
        }

        // Stores
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.postgres_url = Some(url);
        }
        if let Some(size) = parse_env("DATABASE_POOL_SIZE")? {
            config.database.postgres_pool_size = size;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            config.database.redis_url = Some(url);
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.logging.format = format.parse()?;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let defaults = Self::default();

        if env_config.environment != defaults.environment {
            self.environment = env_config.environment;
        }
        if env_config.server.host != defaults.server.host {
            self.server.host = env_config.server.host;
        }
        if env_config.server.port != defaults.server.port {
            self.server.port = env_config.server.port;
        }
        if env_config.identity.provider != defaults.identity.provider {
            self.identity.provider = env_config.identity.provider;
        }
        if env_config.identity.url.is_some() {
            self.identity.url = env_config.identity.url;
        }

        // Always use env for sensitive values
        if env_config.identity.api_key.is_some() {
            self.identity.api_key = env_config.identity.api_key;
        }
        if env_config.identity.jwt_secret != defaults.identity.jwt_secret {
            self.identity.jwt_secret = env_config.identity.jwt_secret;
        }
        if env_config.database.postgres_url.is_some() {
            self.database.postgres_url = env_config.database.postgres_url;
        }
        if env_config.database.redis_url.is_some() {
            self.database.redis_url = env_config.database.redis_url;
        }

        Ok(self)
    }

    /// Refuse development-only defaults outside development
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment == Environment::Production
            && self.identity.provider == IdentityProviderKind::Local
            && self.identity.jwt_secret == DEV_JWT_SECRET
        {
            return Err(ConfigError::Missing("JWT_SECRET".to_string()));
        }
        if self.identity.provider == IdentityProviderKind::Remote && self.identity.url.is_none() {
            return Err(ConfigError::Missing("IDENTITY_URL".to_string()));
        }
        if self.rate_limit.max == 0 || self.rate_limit.auth_max == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RATE_LIMIT_MAX".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidValue {
                key: "TOLLGATE_ENV".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            // Empty by default; set explicitly per deployment
            cors_origins: vec![],
        }
    }
}

pub const DEV_JWT_SECRET: &str = "development-secret-key-change-in-production";

/// Which identity backend the server talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProviderKind {
    /// In-process user store with self-issued JWTs
    #[default]
    Local,
    /// GoTrue-compatible identity service over HTTP
    Remote,
}

impl std::str::FromStr for IdentityProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" | "gotrue" | "supabase" => Ok(Self::Remote),
            _ => Err(ConfigError::InvalidValue {
                key: "IDENTITY_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Identity backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub provider: IdentityProviderKind,

    /// Base URL of the remote identity service
    pub url: Option<String>,

    /// API key sent to the remote identity service
    pub api_key: Option<String>,

    /// HMAC secret for locally issued tokens
    pub jwt_secret: String,

    /// Issuer claim for locally issued tokens
    pub jwt_issuer: String,

    /// Access token lifetime
    pub access_token_ttl_secs: u64,

    /// How long an MFA challenge stays redeemable
    pub mfa_challenge_ttl_secs: u64,

    /// Consecutive failed password checks before lockout
    pub max_failed_attempts: u32,

    /// Lockout length after too many failures
    pub lockout_duration_secs: u64,

    /// Remote request timeout
    pub request_timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            provider: IdentityProviderKind::Local,
            url: None,
            api_key: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_issuer: "tollgate".to_string(),
            access_token_ttl_secs: 3600,
            mfa_challenge_ttl_secs: 300,
            max_failed_attempts: 5,
            lockout_duration_secs: 900,
            request_timeout_secs: 10,
        }
    }
}

impl IdentityConfig {
    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_secs)
    }

    pub fn mfa_challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.mfa_challenge_ttl_secs)
    }

    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(self.lockout_duration_secs)
    }
}

/// Sliding-window rate limit defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window for general protected routes
    pub window_ms: u64,

    /// Requests allowed per window on protected routes
    pub max: u32,

    /// Window for login/register/resend endpoints
    pub auth_window_ms: u64,

    /// Requests allowed per window on auth endpoints
    pub auth_max: u32,

    /// Key prefix in the shared counter store
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max: 100,
            auth_window_ms: 15 * 60_000,
            auth_max: 10,
            key_prefix: "tollgate:rl".to_string(),
        }
    }
}

/// Client session timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Refresh this long before the access token expires
    pub refresh_threshold_secs: u64,

    /// Idle ceiling before a forced logout
    pub idle_timeout_secs: u64,

    /// How often the idle checker runs
    pub activity_check_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_threshold_secs: 5 * 60,
            idle_timeout_secs: 30 * 60,
            activity_check_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn activity_check_interval(&self) -> Duration {
        Duration::from_secs(self.activity_check_secs)
    }
}

/// Store connections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL URL for the role store (in-memory store when absent)
    pub postgres_url: Option<String>,

    /// PostgreSQL connection pool size
    pub postgres_pool_size: u32,

    /// Redis URL for the shared rate-limit counters (in-memory when absent)
    pub redis_url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            postgres_pool_size: 10,
            redis_url: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidValue {
                key: "LOG_FORMAT".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "tollgate_api=debug,tower_http=debug".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.session.refresh_threshold(), Duration::from_secs(300));
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(1800));
        assert_eq!(config.session.activity_check_interval(), Duration::from_secs(60));
        assert_eq!(config.identity.lockout_duration(), Duration::from_secs(900));
        assert_eq!(config.identity.provider, IdentityProviderKind::Local);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
environment = "production"

[identity]
provider = "remote"
url = "https://id.example.com"

[rate_limit]
max = 20
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert!(config.environment.is_production());
        assert_eq!(config.identity.provider, IdentityProviderKind::Remote);
        assert_eq!(config.rate_limit.max, 20);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_dev_secret_in_production() {
        let mut config = AppConfig::default();
        config.environment = Environment::Production;
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_validate_requires_remote_url() {
        let mut config = AppConfig::default();
        config.identity.provider = IdentityProviderKind::Remote;
        assert!(matches!(config.validate(), Err(ConfigError::Missing(key)) if key == "IDENTITY_URL"));
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("supabase".parse::<IdentityProviderKind>().unwrap(), IdentityProviderKind::Remote);
        assert!("ldap".parse::<IdentityProviderKind>().is_err());
    }
}
