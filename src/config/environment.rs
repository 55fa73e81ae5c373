// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Parses issuer, key, rate limit, session, detection, and Redis settings from env vars
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Environment-based configuration management for production deployment

use crate::keys::KeyManagerConfig;
use crate::rate_limiting::RateLimitPolicy;
use crate::sessions::SessionConfig;
use crate::store::RetentionPolicy;
use crate::tokens::TokenIssuerConfig;
use chrono::Duration;
use identity_core::constants::{
    anomaly, keys, rate_limits, retention, service_names, sessions, token_ttl,
};
use identity_core::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};
use url::Url;

/// Smallest RSA modulus accepted for signing keys
const MIN_RSA_KEY_SIZE_BITS: usize = 2048;

/// Upper bound for any configured lifetime or interval (ten years)
const MAX_CONFIG_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Strongly typed log level configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Default level
    #[default]
    Info,
    /// Verbose
    Debug,
    /// Everything
    Trace,
}

impl LogLevel {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        })
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Production deployment; requires an https issuer
    Production,
    /// Test runs
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Testing => "testing",
        })
    }
}

/// Where rate limit counters live
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// In-process sharded map
    #[default]
    Local,
    /// Shared Redis counters
    Redis,
}

impl FromStr for RateLimitBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "memory" => Ok(Self::Local),
            "redis" => Ok(Self::Redis),
            other => Err(AppError::config(format!(
                "Unknown RATE_LIMIT_BACKEND '{other}', expected local or redis"
            ))),
        }
    }
}

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// HTTP bind address
    pub host: String,
    /// Log level
    pub log_level: LogLevel,
    /// Deployment environment
    pub environment: Environment,
    /// Issuer and token lifetimes
    pub issuer: IssuerConfig,
    /// Signing key settings
    pub keys: KeyConfig,
    /// Authentication endpoint limits
    pub rate_limits: RateLimitConfig,
    /// Session settings
    pub sessions: SessionSettings,
    /// Anomaly detection settings
    pub anomaly: AnomalyConfig,
    /// Redis connection, required for the Redis rate limit backend
    pub redis: Option<RedisConfig>,
    /// User granted the super admin role at startup
    pub bootstrap_admin_user: Option<String>,
    /// Store retention settings
    pub retention: RetentionConfig,
    /// Reverse proxies whose `x-forwarded-for` header is believed
    pub trusted_proxies: Vec<IpAddr>,
}

/// Issuer URL, advertised scopes, and per-type token lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// `iss` claim and discovery base URL
    pub url: String,
    /// Scopes advertised in discovery
    pub scopes: Vec<String>,
    /// Access token lifetime in seconds
    pub access_ttl_secs: i64,
    /// ID token lifetime in seconds
    pub id_ttl_secs: i64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: i64,
}

/// Signing key settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// RSA modulus size for generated keys
    pub key_size_bits: usize,
    /// Days between automatic rotations
    pub rotation_interval_days: i64,
    /// PKCS#8 PEM to load as the initial active key instead of generating one
    pub private_key_path: Option<PathBuf>,
    /// Seconds between rotation and retirement checks
    pub maintenance_interval_secs: u64,
}

/// Authentication endpoint limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Counter backend
    pub backend: RateLimitBackend,
    /// Login attempts per window
    pub login: u32,
    /// Registrations per window
    pub registration: u32,
    /// Password reset requests per window
    pub password_reset: u32,
    /// Token requests per window
    pub token: u32,
    /// Authorization requests per window
    pub authorize: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Seconds between sweeps of closed windows
    pub sweep_interval_secs: u64,
}

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Session lifetime in hours
    pub ttl_hours: i64,
    /// Seconds a pending consent stays approvable
    pub pending_consent_ttl_secs: i64,
}

/// Anomaly detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Hard deadline for one scan in milliseconds
    pub deadline_ms: u64,
}

/// Store retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Days token events are kept for statistics and anomaly scans
    pub event_retention_days: i64,
    /// Days audit entries are kept
    pub audit_retention_days: i64,
    /// Seconds between retention sweeps
    pub sweep_interval_secs: u64,
}

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `redis://` URL
    pub url: String,
    /// Connect timeout in seconds
    pub connection_timeout_secs: u64,
    /// Per-command timeout in seconds
    pub response_timeout_secs: u64,
    /// Connection attempts at startup
    pub initial_connection_retries: u32,
    /// First backoff delay in milliseconds
    pub initial_retry_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub max_retry_delay_ms: u64,
}

impl Default for ServerConfig {
    /// Built-in defaults, the same values `from_env` uses for unset variables
    fn default() -> Self {
        Self {
            http_port: 8080,
            host: "0.0.0.0".to_owned(),
            log_level: LogLevel::Info,
            environment: Environment::Development,
            issuer: IssuerConfig {
                url: service_names::DEFAULT_ISSUER.to_owned(),
                scopes: parse_scopes("openid,profile,email,offline_access"),
                access_ttl_secs: token_ttl::ACCESS_SECS,
                id_ttl_secs: token_ttl::ID_SECS,
                refresh_ttl_secs: token_ttl::REFRESH_SECS,
            },
            keys: KeyConfig {
                key_size_bits: keys::RSA_KEY_SIZE_BITS,
                rotation_interval_days: keys::ROTATION_INTERVAL_DAYS,
                private_key_path: None,
                maintenance_interval_secs: 3_600,
            },
            rate_limits: RateLimitConfig {
                backend: RateLimitBackend::Local,
                login: rate_limits::LOGIN_LIMIT,
                registration: rate_limits::REGISTRATION_LIMIT,
                password_reset: rate_limits::PASSWORD_RESET_LIMIT,
                token: rate_limits::TOKEN_LIMIT,
                authorize: rate_limits::AUTHORIZE_LIMIT,
                window_ms: rate_limits::WINDOW_MS,
                sweep_interval_secs: rate_limits::SWEEP_INTERVAL_SECS,
            },
            sessions: SessionSettings {
                ttl_hours: sessions::SESSION_TTL_HOURS,
                pending_consent_ttl_secs: sessions::PENDING_CONSENT_TTL_SECS,
            },
            anomaly: AnomalyConfig {
                deadline_ms: anomaly::DEADLINE_MS,
            },
            redis: None,
            bootstrap_admin_user: None,
            retention: RetentionConfig {
                event_retention_days: retention::EVENT_RETENTION_DAYS,
                audit_retention_days: retention::AUDIT_RETENTION_DAYS,
                sweep_interval_secs: retention::SWEEP_INTERVAL_SECS,
            },
            trusted_proxies: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for unparsable values or a configuration that
    /// fails [`validate`](Self::validate)
    pub fn from_env() -> AppResult<Self> {
        info!("Loading configuration from environment variables");

        let redis = match env::var("REDIS_URL") {
            Ok(url) if !url.trim().is_empty() => Some(RedisConfig {
                url,
                connection_timeout_secs: env_parse("REDIS_CONNECTION_TIMEOUT_SECS", 5)?,
                response_timeout_secs: env_parse("REDIS_RESPONSE_TIMEOUT_SECS", 2)?,
                initial_connection_retries: env_parse("REDIS_INITIAL_CONNECTION_RETRIES", 3)?,
                initial_retry_delay_ms: env_parse("REDIS_INITIAL_RETRY_DELAY_MS", 500)?,
                max_retry_delay_ms: env_parse("REDIS_MAX_RETRY_DELAY_MS", 5_000)?,
            }),
            _ => None,
        };

        let config = Self {
            http_port: env_parse("HTTP_PORT", 8080)?,
            host: env_var_or("HOST", "0.0.0.0"),
            log_level: LogLevel::from_str_or_default(&env_var_or("LOG_LEVEL", "info")),
            environment: Environment::from_str_or_default(&env_var_or(
                "ENVIRONMENT",
                "development",
            )),
            issuer: IssuerConfig {
                url: env_var_or("ISSUER_URL", service_names::DEFAULT_ISSUER),
                scopes: parse_scopes(&env_var_or("OAUTH_SCOPES", "openid,profile,email,offline_access")),
                access_ttl_secs: env_parse("ACCESS_TOKEN_TTL_SECS", token_ttl::ACCESS_SECS)?,
                id_ttl_secs: env_parse("ID_TOKEN_TTL_SECS", token_ttl::ID_SECS)?,
                refresh_ttl_secs: env_parse("REFRESH_TOKEN_TTL_SECS", token_ttl::REFRESH_SECS)?,
            },
            keys: KeyConfig {
                key_size_bits: env_parse("RSA_KEY_SIZE_BITS", keys::RSA_KEY_SIZE_BITS)?,
                rotation_interval_days: env_parse(
                    "KEY_ROTATION_INTERVAL_DAYS",
                    keys::ROTATION_INTERVAL_DAYS,
                )?,
                private_key_path: env::var("SIGNING_KEY_PATH").ok().map(PathBuf::from),
                maintenance_interval_secs: env_parse("KEY_MAINTENANCE_INTERVAL_SECS", 3_600)?,
            },
            rate_limits: RateLimitConfig {
                backend: env_var_or("RATE_LIMIT_BACKEND", "local").parse()?,
                login: env_parse("RATE_LIMIT_LOGIN", rate_limits::LOGIN_LIMIT)?,
                registration: env_parse("RATE_LIMIT_REGISTRATION", rate_limits::REGISTRATION_LIMIT)?,
                password_reset: env_parse(
                    "RATE_LIMIT_PASSWORD_RESET",
                    rate_limits::PASSWORD_RESET_LIMIT,
                )?,
                token: env_parse("RATE_LIMIT_TOKEN", rate_limits::TOKEN_LIMIT)?,
                authorize: env_parse("RATE_LIMIT_AUTHORIZE", rate_limits::AUTHORIZE_LIMIT)?,
                window_ms: env_parse("RATE_LIMIT_WINDOW_MS", rate_limits::WINDOW_MS)?,
                sweep_interval_secs: env_parse(
                    "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                    rate_limits::SWEEP_INTERVAL_SECS,
                )?,
            },
            sessions: SessionSettings {
                ttl_hours: env_parse("SESSION_TTL_HOURS", sessions::SESSION_TTL_HOURS)?,
                pending_consent_ttl_secs: env_parse(
                    "PENDING_CONSENT_TTL_SECS",
                    sessions::PENDING_CONSENT_TTL_SECS,
                )?,
            },
            anomaly: AnomalyConfig {
                deadline_ms: env_parse("ANOMALY_DEADLINE_MS", anomaly::DEADLINE_MS)?,
            },
            redis,
            bootstrap_admin_user: env::var("BOOTSTRAP_ADMIN_USER")
                .ok()
                .filter(|u| !u.trim().is_empty()),
            retention: RetentionConfig {
                event_retention_days: env_parse(
                    "EVENT_RETENTION_DAYS",
                    retention::EVENT_RETENTION_DAYS,
                )?,
                audit_retention_days: env_parse(
                    "AUDIT_RETENTION_DAYS",
                    retention::AUDIT_RETENTION_DAYS,
                )?,
                sweep_interval_secs: env_parse(
                    "RETENTION_SWEEP_INTERVAL_SECS",
                    retention::SWEEP_INTERVAL_SECS,
                )?,
            },
            trusted_proxies: parse_trusted_proxies(&env_var_or("TRUSTED_PROXIES", ""))?,
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first invalid setting
    pub fn validate(&self) -> AppResult<()> {
        let issuer = Url::parse(&self.issuer.url)
            .map_err(|e| AppError::config(format!("ISSUER_URL is not a valid URL: {e}")))?;
        if self.environment.is_production() && issuer.scheme() != "https" {
            return Err(AppError::config("ISSUER_URL must use https in production"));
        }

        self.token_issuer_config()?;
        self.key_manager_config()?;
        self.session_config()?;
        self.pending_consent_ttl()?;
        let retention = self.retention_policy()?;
        let lookback = Duration::hours(i64::from(anomaly::MAX_LOOKBACK_HOURS));
        if retention.event_retention < lookback {
            return Err(AppError::config(format!(
                "EVENT_RETENTION_DAYS must cover the {}h anomaly lookback",
                anomaly::MAX_LOOKBACK_HOURS
            )));
        }
        if self.retention.sweep_interval_secs == 0 {
            return Err(AppError::config("RETENTION_SWEEP_INTERVAL_SECS must be positive"));
        }

        if self.keys.key_size_bits < MIN_RSA_KEY_SIZE_BITS {
            return Err(AppError::config(format!(
                "RSA_KEY_SIZE_BITS must be at least {MIN_RSA_KEY_SIZE_BITS}"
            )));
        }

        let limits = &self.rate_limits;
        for (name, limit) in [
            ("RATE_LIMIT_LOGIN", limits.login),
            ("RATE_LIMIT_REGISTRATION", limits.registration),
            ("RATE_LIMIT_PASSWORD_RESET", limits.password_reset),
            ("RATE_LIMIT_TOKEN", limits.token),
            ("RATE_LIMIT_AUTHORIZE", limits.authorize),
        ] {
            if limit == 0 {
                return Err(AppError::config(format!("{name} must be at least 1")));
            }
        }
        if limits.window_ms == 0 || limits.sweep_interval_secs == 0 {
            return Err(AppError::config(
                "RATE_LIMIT_WINDOW_MS and RATE_LIMIT_SWEEP_INTERVAL_SECS must be positive",
            ));
        }
        if limits.window_ms > rate_limits::MAX_WINDOW_MS {
            return Err(AppError::config(format!(
                "RATE_LIMIT_WINDOW_MS must be at most {}",
                rate_limits::MAX_WINDOW_MS
            )));
        }
        if limits.backend == RateLimitBackend::Redis && self.redis.is_none() {
            return Err(AppError::config(
                "RATE_LIMIT_BACKEND=redis requires REDIS_URL",
            ));
        }
        if self.anomaly.deadline_ms == 0 {
            return Err(AppError::config("ANOMALY_DEADLINE_MS must be positive"));
        }
        if self.keys.maintenance_interval_secs == 0 {
            return Err(AppError::config("KEY_MAINTENANCE_INTERVAL_SECS must be positive"));
        }

        if self.bootstrap_admin_user.is_some() && self.environment.is_production() {
            warn!("BOOTSTRAP_ADMIN_USER is set in production");
        }
        Ok(())
    }

    /// Get a summary of the configuration for logging (without secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Identity Server Configuration:\n\
             - HTTP: {}:{}\n\
             - Environment: {}\n\
             - Log Level: {}\n\
             - Issuer: {}\n\
             - Key Size: {} bits, rotation every {} days\n\
             - Rate Limit Backend: {:?}\n\
             - Session TTL: {}h",
            self.host,
            self.http_port,
            self.environment,
            self.log_level,
            self.issuer.url,
            self.keys.key_size_bits,
            self.keys.rotation_interval_days,
            self.rate_limits.backend,
            self.sessions.ttl_hours,
        )
    }

    /// Token issuer settings
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a TTL is out of range
    pub fn token_issuer_config(&self) -> AppResult<TokenIssuerConfig> {
        Ok(TokenIssuerConfig {
            issuer: self.issuer.url.trim_end_matches('/').to_owned(),
            access_ttl: config_duration("ACCESS_TOKEN_TTL_SECS", self.issuer.access_ttl_secs, 1)?,
            id_ttl: config_duration("ID_TOKEN_TTL_SECS", self.issuer.id_ttl_secs, 1)?,
            refresh_ttl: config_duration(
                "REFRESH_TOKEN_TTL_SECS",
                self.issuer.refresh_ttl_secs,
                1,
            )?,
        })
    }

    /// Key manager settings
    ///
    /// The retirement floor covers the longest-lived token type.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a TTL or the rotation interval is out of range
    pub fn key_manager_config(&self) -> AppResult<KeyManagerConfig> {
        let longest = self
            .issuer
            .access_ttl_secs
            .max(self.issuer.id_ttl_secs)
            .max(self.issuer.refresh_ttl_secs);
        Ok(KeyManagerConfig {
            key_size_bits: self.keys.key_size_bits,
            rotation_interval: config_duration(
                "KEY_ROTATION_INTERVAL_DAYS",
                self.keys.rotation_interval_days,
                SECS_PER_DAY,
            )?,
            retirement_floor: config_duration("REFRESH_TOKEN_TTL_SECS", longest, 1)?,
        })
    }

    /// Rate limit policy table
    #[must_use]
    pub const fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            login: self.rate_limits.login,
            registration: self.rate_limits.registration,
            password_reset: self.rate_limits.password_reset,
            token: self.rate_limits.token,
            authorize: self.rate_limits.authorize,
            window_ms: self.rate_limits.window_ms,
        }
    }

    /// Session manager settings
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the session TTL is out of range
    pub fn session_config(&self) -> AppResult<SessionConfig> {
        Ok(SessionConfig {
            ttl: config_duration("SESSION_TTL_HOURS", self.sessions.ttl_hours, SECS_PER_HOUR)?,
        })
    }

    /// Store retention policy
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a retention period is out of range
    pub fn retention_policy(&self) -> AppResult<RetentionPolicy> {
        Ok(RetentionPolicy {
            event_retention: config_duration(
                "EVENT_RETENTION_DAYS",
                self.retention.event_retention_days,
                SECS_PER_DAY,
            )?,
            audit_retention: config_duration(
                "AUDIT_RETENTION_DAYS",
                self.retention.audit_retention_days,
                SECS_PER_DAY,
            )?,
        })
    }

    /// Whether a direct peer may speak for the client via `x-forwarded-for`
    #[must_use]
    pub fn is_trusted_proxy(&self, peer: IpAddr) -> bool {
        self.trusted_proxies.contains(&peer)
    }

    /// How long a pending consent stays approvable
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the TTL is out of range
    pub fn pending_consent_ttl(&self) -> AppResult<Duration> {
        config_duration(
            "PENDING_CONSENT_TTL_SECS",
            self.sessions.pending_consent_ttl_secs,
            1,
        )
    }
}

const SECS_PER_HOUR: i64 = 60 * 60;
const SECS_PER_DAY: i64 = 24 * SECS_PER_HOUR;

/// Convert `value` units of `unit_secs` into a duration no longer than
/// [`MAX_CONFIG_DURATION_SECS`]
fn config_duration(name: &str, value: i64, unit_secs: i64) -> AppResult<Duration> {
    value
        .checked_mul(unit_secs)
        .filter(|secs| (1..=MAX_CONFIG_DURATION_SECS).contains(secs))
        .and_then(Duration::try_seconds)
        .ok_or_else(|| {
            AppError::config(format!(
                "{name} must be positive and at most {MAX_CONFIG_DURATION_SECS} seconds"
            ))
        })
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse an environment variable, falling back to `default` when unset
fn env_parse<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::config(format!("Invalid {key} value '{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated list of proxy IP addresses
fn parse_trusted_proxies(raw: &str) -> AppResult<Vec<IpAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|e| AppError::config(format!("Invalid TRUSTED_PROXIES entry '{s}': {e}")))
        })
        .collect()
}

/// Parse comma-separated scopes
fn parse_scopes(scopes_str: &str) -> Vec<String> {
    scopes_str
        .split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}
