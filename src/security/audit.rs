// ABOUTME: Append-only security audit log with severity-routed structured logging
// ABOUTME: Sink failures are logged for operators but never fail the calling operation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::store::AuditRepository;
use identity_core::errors::AppResult;
use identity_core::models::{AuditEntry, AuditFilter, AuditSeverity};
use std::sync::Arc;

/// Security audit trail
///
/// Audit is observability, not a transactional participant: a security
/// operation that already succeeded stays successful when its audit write
/// fails.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditRepository>,
}

impl AuditLog {
    /// Create an audit log over a sink
    #[must_use]
    pub fn new(sink: Arc<dyn AuditRepository>) -> Self {
        Self { sink }
    }

    /// Emit the entry to the log pipeline and persist it
    pub async fn append(&self, entry: AuditEntry) {
        Self::emit(&entry);

        if let Err(e) = self.sink.append_entry(&entry).await {
            tracing::error!(
                target: "security_audit",
                entry_id = %entry.id,
                action = ?entry.action,
                resource_type = %entry.resource_type,
                resource_id = %entry.resource_id,
                error = %e,
                "Audit sink write failed; operation outcome unchanged"
            );
        }
    }

    /// Entries matching `filter`, newest first
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the sink cannot be read
    pub async fn query(&self, filter: &AuditFilter) -> AppResult<Vec<AuditEntry>> {
        self.sink.query_entries(filter).await
    }

    fn emit(entry: &AuditEntry) {
        match entry.severity {
            AuditSeverity::Info => tracing::info!(
                target: "security_audit",
                entry_id = %entry.id,
                action = ?entry.action,
                actor = ?entry.actor_user_id,
                resource_type = %entry.resource_type,
                resource_id = %entry.resource_id,
                ip = ?entry.ip,
                "Security audit event"
            ),
            AuditSeverity::Warning => tracing::warn!(
                target: "security_audit",
                entry_id = %entry.id,
                action = ?entry.action,
                actor = ?entry.actor_user_id,
                resource_type = %entry.resource_type,
                resource_id = %entry.resource_id,
                ip = ?entry.ip,
                "Security audit warning"
            ),
            AuditSeverity::Critical => tracing::error!(
                target: "security_alert",
                entry_id = %entry.id,
                action = ?entry.action,
                actor = ?entry.actor_user_id,
                resource_type = %entry.resource_type,
                resource_id = %entry.resource_id,
                ip = ?entry.ip,
                user_agent = ?entry.user_agent,
                "SECURITY ALERT"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use identity_core::errors::AppError;
    use identity_core::models::AuditAction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct BrokenSink {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl AuditRepository for BrokenSink {
        async fn append_entry(&self, _entry: &AuditEntry) -> AppResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(AppError::internal("disk full"))
        }

        async fn query_entries(&self, _filter: &AuditFilter) -> AppResult<Vec<AuditEntry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_append_swallows_sink_failure() {
        let sink = Arc::new(BrokenSink::default());
        let log = AuditLog::new(sink.clone());
        log.append(AuditEntry::new(AuditAction::SessionTerminated, "session", "s1"))
            .await;
        log.append(AuditEntry::new(AuditAction::SessionCreated, "session", "s2"))
            .await;

        // Each write reached the sink and the log stays usable afterwards
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
        assert!(log.query(&AuditFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_newest_first_with_filter() {
        let store = Arc::new(crate::store::MemoryStore::new());
        let log = AuditLog::new(store);
        log.append(AuditEntry::new(AuditAction::ClientRegistered, "client", "c1"))
            .await;
        log.append(AuditEntry::new(AuditAction::ClientSecretRotated, "client", "c1"))
            .await;
        log.append(AuditEntry::new(AuditAction::ClientRegistered, "client", "c2"))
            .await;

        let all = log
            .query(&AuditFilter {
                resource_id: Some("c1".to_owned()),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].action, AuditAction::ClientSecretRotated);

        let limited = log
            .query(&AuditFilter {
                limit: Some(1),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].resource_id, "c2");
    }
}
