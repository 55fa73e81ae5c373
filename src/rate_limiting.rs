// ABOUTME: Fixed-window request limiting for authentication endpoints over a pluggable counter store
// ABOUTME: Local sharded map by default, Redis for deployments sharing limits across instances
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Rate Limiting
//!
//! Each identifier gets a fixed window. The first request after the window
//! elapses starts a new one with a count of 1. Counter mutation is atomic per
//! identifier in every backend, so concurrent checks never lose increments.

/// Process-local counter store
pub mod local;
/// Redis counter store
#[cfg(feature = "redis-rate-limit")]
pub mod redis;

pub use local::LocalRateLimitStore;
#[cfg(feature = "redis-rate-limit")]
pub use redis::RedisRateLimitStore;

use crate::lifecycle::{spawn_periodic, BackgroundTask};
use crate::security::AuditLog;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use identity_core::constants::rate_limits;
use identity_core::errors::{AppError, AppResult};
use identity_core::models::{AuditAction, AuditEntry, AuditSeverity, RequestOrigin};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;

/// Window state for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitCounter {
    /// What is being limited (IP, account, endpoint-qualified)
    pub identifier: String,
    /// Requests counted in the current window
    pub count: u32,
    /// When the current window opened
    pub window_start: DateTime<Utc>,
    /// Window length
    pub window_ms: u64,
}

impl RateLimitCounter {
    /// When the current window closes, saturating at the latest representable instant
    #[must_use]
    pub fn reset_at(&self) -> DateTime<Utc> {
        self.window_start
            .checked_add_signed(window_duration(self.window_ms))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether the window has closed as of `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at()
    }
}

fn window_duration(window_ms: u64) -> Duration {
    i64::try_from(window_ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .unwrap_or(Duration::MAX)
}

/// Counter storage; implementations make `increment` atomic per identifier
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request, opening a fresh window if none is current
    async fn increment(
        &self,
        identifier: &str,
        window_ms: u64,
        now: DateTime<Utc>,
    ) -> AppResult<RateLimitCounter>;

    /// Drop counters whose window has closed; returns how many were removed
    async fn sweep(&self, now: DateTime<Utc>) -> AppResult<usize>;
}

/// Outcome of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    /// `count <= limit`
    pub allowed: bool,
    /// Configured limit
    pub limit: u32,
    /// `max(0, limit - count)`
    pub remaining: u32,
    /// When the window closes
    pub reset_at: DateTime<Utc>,
}

/// Rate-limited authentication endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEndpoint {
    /// Password login
    Login,
    /// Account registration
    Registration,
    /// Password reset request
    PasswordReset,
    /// Token endpoint
    Token,
    /// Authorization endpoint
    Authorize,
}

impl AuthEndpoint {
    /// Key segment for this endpoint
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Registration => "registration",
            Self::PasswordReset => "password_reset",
            Self::Token => "token",
            Self::Authorize => "authorize",
        }
    }
}

impl fmt::Display for AuthEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-endpoint limits sharing one window length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
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
    /// Window length
    pub window_ms: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            login: rate_limits::LOGIN_LIMIT,
            registration: rate_limits::REGISTRATION_LIMIT,
            password_reset: rate_limits::PASSWORD_RESET_LIMIT,
            token: rate_limits::TOKEN_LIMIT,
            authorize: rate_limits::AUTHORIZE_LIMIT,
            window_ms: rate_limits::WINDOW_MS,
        }
    }
}

impl RateLimitPolicy {
    /// Limit for an endpoint
    #[must_use]
    pub const fn limit_for(&self, endpoint: AuthEndpoint) -> u32 {
        match endpoint {
            AuthEndpoint::Login => self.login,
            AuthEndpoint::Registration => self.registration,
            AuthEndpoint::PasswordReset => self.password_reset,
            AuthEndpoint::Token => self.token,
            AuthEndpoint::Authorize => self.authorize,
        }
    }
}

/// Request limiter over a counter store
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policy: RateLimitPolicy,
    audit: AuditLog,
}

impl RateLimiter {
    /// Create a limiter
    #[must_use]
    pub fn new(store: Arc<dyn RateLimitStore>, policy: RateLimitPolicy, audit: AuditLog) -> Self {
        Self {
            store,
            policy,
            audit,
        }
    }

    /// Active policy
    #[must_use]
    pub const fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Count a request for `identifier` against `limit` per `window_ms`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a window that is zero or longer than a day,
    /// and `InternalError` when the counter store fails
    pub async fn check(
        &self,
        identifier: &str,
        limit: u32,
        window_ms: u64,
    ) -> AppResult<RateLimitDecision> {
        self.check_at(identifier, limit, window_ms, Utc::now()).await
    }

    /// [`check`](Self::check) with an explicit clock
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a window that is zero or longer than a day,
    /// and `InternalError` when the counter store fails
    pub async fn check_at(
        &self,
        identifier: &str,
        limit: u32,
        window_ms: u64,
        now: DateTime<Utc>,
    ) -> AppResult<RateLimitDecision> {
        if window_ms == 0 || window_ms > rate_limits::MAX_WINDOW_MS {
            return Err(AppError::invalid_input(format!(
                "Rate limit window must be between 1 and {} ms",
                rate_limits::MAX_WINDOW_MS
            )));
        }
        let counter = self.store.increment(identifier, window_ms, now).await?;
        Ok(RateLimitDecision {
            allowed: counter.count <= limit,
            limit,
            remaining: limit.saturating_sub(counter.count),
            reset_at: counter.reset_at(),
        })
    }

    /// Drop closed windows
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the counter store fails
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<usize> {
        self.store.sweep(now).await
    }

    /// Apply the endpoint's limit by client IP and, when given, by account
    ///
    /// Both counters are charged. The returned decision is the tighter one.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitExceeded` (with `remaining = 0` and the reset time)
    /// when either counter is over the limit
    pub async fn enforce(
        &self,
        endpoint: AuthEndpoint,
        client_ip: &str,
        account: Option<&str>,
        origin: &RequestOrigin,
    ) -> AppResult<RateLimitDecision> {
        let limit = self.policy.limit_for(endpoint);
        let window_ms = self.policy.window_ms;

        let mut decision = self
            .check(&format!("{endpoint}:ip:{client_ip}"), limit, window_ms)
            .await?;
        if let Some(account) = account {
            let by_account = self
                .check(&format!("{endpoint}:account:{account}"), limit, window_ms)
                .await?;
            if !by_account.allowed || by_account.remaining < decision.remaining {
                decision = RateLimitDecision {
                    allowed: decision.allowed && by_account.allowed,
                    reset_at: decision.reset_at.max(by_account.reset_at),
                    ..by_account
                };
            }
        }

        if decision.allowed {
            return Ok(decision);
        }

        tracing::warn!(
            endpoint = %endpoint,
            client_ip = %client_ip,
            account = ?account,
            limit,
            reset_at = %decision.reset_at,
            "Rate limit exceeded"
        );
        self.audit
            .append(
                AuditEntry::new(AuditAction::RateLimitTriggered, "endpoint", endpoint.as_str())
                    .with_change(
                        serde_json::Value::Null,
                        json!({ "limit": limit, "reset_at": decision.reset_at, "account": account }),
                    )
                    .with_origin(origin)
                    .with_severity(AuditSeverity::Warning),
            )
            .await;
        Err(AppError::rate_limit_exceeded(limit, decision.reset_at))
    }
}

/// Periodically sweep closed windows until shut down
#[must_use]
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, interval: std::time::Duration) -> BackgroundTask {
    spawn_periodic("rate_limit_sweeper", interval, move || {
        let limiter = limiter.clone();
        async move {
            match limiter.sweep(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Swept expired rate limit windows"),
                Err(e) => tracing::warn!(error = %e, "Rate limit sweep failed"),
            }
        }
    })
}
