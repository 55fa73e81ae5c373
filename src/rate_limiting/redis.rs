// ABOUTME: Redis-backed rate limit counters shared by every server instance
// ABOUTME: A server-side script increments and sets the window expiry atomically
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::{RateLimitCounter, RateLimitStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use identity_core::constants::rate_limits::REDIS_KEY_PREFIX;
use identity_core::errors::{AppError, AppResult};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::Script;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

/// Increment, open the window on first hit, and report the remaining TTL
const INCREMENT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
";

/// Connection settings for the shared counter store
#[derive(Debug, Clone)]
pub struct RedisRateLimitConfig {
    /// `redis://` URL
    pub url: String,
    /// Connect timeout
    pub connection_timeout: StdDuration,
    /// Per-command timeout
    pub response_timeout: StdDuration,
    /// Attempts at startup before giving up
    pub initial_connection_retries: u32,
    /// First backoff delay, doubled per attempt
    pub initial_retry_delay_ms: u64,
    /// Backoff cap
    pub max_retry_delay_ms: u64,
}

/// Counters shared through Redis; keys expire with their window
pub struct RedisRateLimitStore {
    manager: ConnectionManager,
    script: Script,
}

impl RedisRateLimitStore {
    /// Connect with exponential backoff
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for a malformed URL and `InternalError` when
    /// every connection attempt fails
    pub async fn connect(config: &RedisRateLimitConfig) -> AppResult<Self> {
        info!(
            "Connecting rate limiter to Redis (timeout={}ms, retries={})",
            config.connection_timeout.as_millis(),
            config.initial_connection_retries
        );
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| AppError::config(format!("Invalid Redis URL: {e}")))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(config.connection_timeout)
            .set_response_timeout(config.response_timeout);

        let mut delay_ms = config.initial_retry_delay_ms;
        let mut last_error = None;
        for attempt in 0..=config.initial_connection_retries {
            match ConnectionManager::new_with_config(client.clone(), manager_config.clone()).await
            {
                Ok(manager) => {
                    info!(attempt, "Rate limiter connected to Redis");
                    return Ok(Self {
                        manager,
                        script: Script::new(INCREMENT_SCRIPT),
                    });
                }
                Err(e) => {
                    if attempt < config.initial_connection_retries {
                        warn!(
                            "Redis connection attempt {}/{} failed, retrying in {}ms: {}",
                            attempt + 1,
                            config.initial_connection_retries + 1,
                            delay_ms,
                            e
                        );
                        tokio::time::sleep(StdDuration::from_millis(delay_ms)).await;
                        delay_ms = (delay_ms * 2).min(config.max_retry_delay_ms);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(AppError::internal(format!(
            "Failed to connect to Redis after {} attempts: {}",
            config.initial_connection_retries + 1,
            last_error.map_or_else(|| "unknown error".to_owned(), |e| e.to_string())
        )))
    }

    fn build_key(identifier: &str) -> String {
        format!("{REDIS_KEY_PREFIX}{identifier}")
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment(
        &self,
        identifier: &str,
        window_ms: u64,
        now: DateTime<Utc>,
    ) -> AppResult<RateLimitCounter> {
        let mut conn = self.manager.clone();
        let (count, ttl_ms): (i64, i64) = self
            .script
            .key(Self::build_key(identifier))
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::internal(format!("Redis rate limit increment failed: {e}")))?;

        let window = i64::try_from(window_ms).unwrap_or(i64::MAX);
        let elapsed_ms = window.saturating_sub(ttl_ms.max(0));
        Ok(RateLimitCounter {
            identifier: identifier.to_owned(),
            count: u32::try_from(count).unwrap_or(u32::MAX),
            window_start: now - Duration::milliseconds(elapsed_ms),
            window_ms,
        })
    }

    async fn sweep(&self, _now: DateTime<Utc>) -> AppResult<usize> {
        // Redis expires keys with their window
        Ok(0)
    }
}
