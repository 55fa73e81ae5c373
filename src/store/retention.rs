// ABOUTME: Periodic retention sweep that bounds the in-memory store's growth
// ABOUTME: Drops expired tokens and sessions plus events and audit entries past their retention
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::RetentionRepository;
use crate::lifecycle::{spawn_periodic, BackgroundTask};
use chrono::{DateTime, Duration, Utc};
use identity_core::constants::retention;
use identity_core::errors::AppResult;
use serde::Serialize;
use std::sync::Arc;

/// How long aged records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Token events older than this are dropped
    pub event_retention: Duration,
    /// Audit entries older than this are dropped
    pub audit_retention: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            event_retention: Duration::days(retention::EVENT_RETENTION_DAYS),
            audit_retention: Duration::days(retention::AUDIT_RETENTION_DAYS),
        }
    }
}

/// What one sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    /// Expired token records
    pub tokens: usize,
    /// Expired sessions
    pub sessions: usize,
    /// Aged token events
    pub events: usize,
    /// Aged audit entries
    pub audit_entries: usize,
}

impl RetentionReport {
    /// Total records removed
    #[must_use]
    pub const fn total(&self) -> usize {
        self.tokens + self.sessions + self.events + self.audit_entries
    }
}

/// Applies a [`RetentionPolicy`] to a store
pub struct StoreRetention {
    store: Arc<dyn RetentionRepository>,
    policy: RetentionPolicy,
}

impl StoreRetention {
    /// Create a sweeper over `store`
    #[must_use]
    pub fn new(store: Arc<dyn RetentionRepository>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Remove everything the policy no longer covers as of `now`
    ///
    /// Token records and sessions go once they expire; a revoked token past
    /// its expiry fails verification on `exp` before any store lookup.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the store fails; earlier removals stand
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<RetentionReport> {
        Ok(RetentionReport {
            tokens: self.store.purge_tokens_expired_before(now).await?,
            sessions: self.store.purge_sessions_expired_before(now).await?,
            events: self
                .store
                .purge_events_before(cutoff(now, self.policy.event_retention))
                .await?,
            audit_entries: self
                .store
                .purge_audit_before(cutoff(now, self.policy.audit_retention))
                .await?,
        })
    }
}

fn cutoff(now: DateTime<Utc>, keep: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(keep).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Run [`StoreRetention::sweep`] every `interval` until shut down
#[must_use]
pub fn spawn_retention_sweeper(
    retention: Arc<StoreRetention>,
    interval: std::time::Duration,
) -> BackgroundTask {
    spawn_periodic("store_retention", interval, move || {
        let retention = retention.clone();
        async move {
            match retention.sweep(Utc::now()).await {
                Ok(report) if report.total() > 0 => tracing::info!(
                    tokens = report.tokens,
                    sessions = report.sessions,
                    events = report.events,
                    audit_entries = report.audit_entries,
                    "Store retention sweep removed records"
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Store retention sweep failed"),
            }
        }
    })
}
