// ABOUTME: Process-local rate limit counters in a sharded concurrent map
// ABOUTME: Entry API holds the shard lock for the whole read-modify-write
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::{RateLimitCounter, RateLimitStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use identity_core::errors::AppResult;

/// Counters for a single instance
#[derive(Debug, Default)]
pub struct LocalRateLimitStore {
    counters: DashMap<String, RateLimitCounter>,
}

impl LocalRateLimitStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked identifiers
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no identifiers are tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for LocalRateLimitStore {
    async fn increment(
        &self,
        identifier: &str,
        window_ms: u64,
        now: DateTime<Utc>,
    ) -> AppResult<RateLimitCounter> {
        let mut entry = self
            .counters
            .entry(identifier.to_owned())
            .or_insert_with(|| RateLimitCounter {
                identifier: identifier.to_owned(),
                count: 0,
                window_start: now,
                window_ms,
            });
        let counter = entry.value_mut();

        if counter.window_ms != window_ms || counter.is_expired(now) {
            counter.count = 0;
            counter.window_start = now;
            counter.window_ms = window_ms;
        }
        counter.count = counter.count.saturating_add(1);

        Ok(counter.clone())
    }

    async fn sweep(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let mut removed = 0;
        self.counters.retain(|_, counter| {
            let keep = !counter.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
