// ABOUTME: Append-only security audit entries and query filters
// ABOUTME: Entries carry before/after values for state-changing operations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::token::RequestOrigin;

/// Security-relevant actions recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Client registered
    ClientRegistered,
    /// Client secret rotated
    ClientSecretRotated,
    /// Client activated or deactivated
    ClientActiveToggled,
    /// Client authentication rejected
    ClientAuthenticationFailed,
    /// Consent recorded
    ConsentGranted,
    /// Consent revoked
    ConsentRevoked,
    /// Session opened
    SessionCreated,
    /// Session terminated
    SessionTerminated,
    /// Token set minted
    TokensIssued,
    /// Refresh token exchanged
    TokenRefreshed,
    /// Signing key rotated
    SigningKeyRotated,
    /// Signing key retired
    SigningKeyRetired,
    /// Rate limit hit on an authentication endpoint
    RateLimitTriggered,
}

/// How loudly an entry is reported to the log pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    /// Routine event
    Info,
    /// Unusual but expected event
    Warning,
    /// Security-relevant failure
    Critical,
}

/// Immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier
    pub id: Uuid,
    /// Acting user, `None` for system actions
    pub actor_user_id: Option<String>,
    /// What happened
    pub action: AuditAction,
    /// Kind of resource affected (e.g. `client`, `session`)
    pub resource_type: String,
    /// Identifier of the resource affected
    pub resource_id: String,
    /// State before the change
    pub old_values: serde_json::Value,
    /// State after the change
    pub new_values: serde_json::Value,
    /// Source IP
    pub ip: Option<String>,
    /// Source user agent
    pub user_agent: Option<String>,
    /// Log severity
    pub severity: AuditSeverity,
    /// When the entry was created
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Create an entry for `action` on a resource
    pub fn new(
        action: AuditAction,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_user_id: None,
            action,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            old_values: serde_json::Value::Null,
            new_values: serde_json::Value::Null,
            ip: None,
            user_agent: None,
            severity: AuditSeverity::Info,
            timestamp: Utc::now(),
        }
    }

    /// Set the acting user
    #[must_use]
    pub fn with_actor(mut self, actor_user_id: impl Into<String>) -> Self {
        self.actor_user_id = Some(actor_user_id.into());
        self
    }

    /// Record before/after values
    #[must_use]
    pub fn with_change(mut self, old_values: serde_json::Value, new_values: serde_json::Value) -> Self {
        self.old_values = old_values;
        self.new_values = new_values;
        self
    }

    /// Copy IP and user agent from the request origin
    #[must_use]
    pub fn with_origin(mut self, origin: &RequestOrigin) -> Self {
        self.ip.clone_from(&origin.ip);
        self.user_agent.clone_from(&origin.user_agent);
        self
    }

    /// Override severity
    #[must_use]
    pub const fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Filter for audit queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Only entries by this actor
    pub actor_user_id: Option<String>,
    /// Only entries with this action
    pub action: Option<AuditAction>,
    /// Only entries about this resource id
    pub resource_id: Option<String>,
    /// Only entries at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Maximum entries returned, newest first
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Whether `entry` passes every set criterion
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.actor_user_id
            .as_ref()
            .is_none_or(|actor| entry.actor_user_id.as_ref() == Some(actor))
            && self.action.is_none_or(|action| entry.action == action)
            && self
                .resource_id
                .as_ref()
                .is_none_or(|id| &entry.resource_id == id)
            && self.since.is_none_or(|since| entry.timestamp >= since)
    }
}
