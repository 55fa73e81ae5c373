// ABOUTME: Multi-device session lifecycle with ownership-checked termination
// ABOUTME: Validation re-reads revocation state from the store on every call
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::security::AuditLog;
use crate::store::SessionRepository;
use chrono::{DateTime, Duration, Utc};
use identity_core::constants::sessions::SESSION_TTL_HOURS;
use identity_core::errors::{AppError, AppResult};
use identity_core::models::{AuditAction, AuditEntry, RequestOrigin, Session};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Session lifetime settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Absolute lifetime from creation
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(SESSION_TTL_HOURS),
        }
    }
}

/// Per-user, per-device sessions
pub struct SessionManager {
    sessions: Arc<dyn SessionRepository>,
    audit: AuditLog,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a session manager
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionRepository>, audit: AuditLog, config: SessionConfig) -> Self {
        Self {
            sessions,
            audit,
            config,
        }
    }

    /// Open a new session for a device
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the store fails
    pub async fn create(
        &self,
        user_id: &str,
        device_info: &str,
        origin: &RequestOrigin,
    ) -> AppResult<Session> {
        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            device_info: device_info.to_owned(),
            created_at: now,
            last_seen_at: now,
            expires_at: now + self.config.ttl,
            revoked: false,
        };
        self.sessions.insert_session(&session).await?;

        self.audit
            .append(
                AuditEntry::new(AuditAction::SessionCreated, "session", &session.session_id)
                    .with_actor(user_id)
                    .with_change(
                        serde_json::Value::Null,
                        json!({ "device_info": device_info, "expires_at": session.expires_at }),
                    )
                    .with_origin(origin),
            )
            .await;
        Ok(session)
    }

    /// Non-revoked, non-expired sessions, most recently seen first
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the store fails
    pub async fn list_active(&self, user_id: &str) -> AppResult<Vec<Session>> {
        let now = Utc::now();
        let mut sessions: Vec<Session> = self
            .sessions
            .sessions_for_user(user_id)
            .await?
            .into_iter()
            .filter(|s| s.is_active(now))
            .collect();
        sessions.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(sessions)
    }

    /// Terminate a session owned by `requesting_user`
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown session and
    /// `PermissionDenied` when it belongs to someone else
    pub async fn terminate(
        &self,
        session_id: &str,
        requesting_user: &str,
        origin: &RequestOrigin,
    ) -> AppResult<()> {
        let session = self.get(session_id).await?;
        if session.user_id != requesting_user {
            tracing::warn!(session_id = %session_id, requester = %requesting_user, "Session termination by non-owner refused");
            return Err(AppError::forbidden("Session belongs to another user"));
        }
        self.revoke(&session, requesting_user, origin).await
    }

    /// Terminate any user's session; callers must hold the admin capability
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown session
    pub async fn force_terminate(
        &self,
        session_id: &str,
        actor: &str,
        origin: &RequestOrigin,
    ) -> AppResult<()> {
        let session = self.get(session_id).await?;
        self.revoke(&session, actor, origin).await
    }

    /// Terminate every active session of a user; returns how many were ended
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the store fails
    pub async fn terminate_all(&self, user_id: &str, origin: &RequestOrigin) -> AppResult<usize> {
        let active = self.list_active(user_id).await?;
        for session in &active {
            self.revoke(session, user_id, origin).await?;
        }
        Ok(active.len())
    }

    /// Confirm a session is live and record activity
    ///
    /// # Errors
    ///
    /// Returns `AuthInvalid` for an unknown, revoked, or expired session
    pub async fn validate(&self, session_id: &str) -> AppResult<Session> {
        self.validate_at(session_id, Utc::now()).await
    }

    /// [`validate`](Self::validate) with an explicit clock
    ///
    /// # Errors
    ///
    /// Returns `AuthInvalid` for an unknown, revoked, or expired session
    pub async fn validate_at(&self, session_id: &str, now: DateTime<Utc>) -> AppResult<Session> {
        let mut session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::auth_invalid("Unknown session"))?;
        if !session.is_active(now) {
            return Err(AppError::auth_invalid("Session revoked or expired"));
        }
        self.sessions.touch_session(session_id, now).await?;
        session.last_seen_at = session.last_seen_at.max(now);
        Ok(session)
    }

    async fn get(&self, session_id: &str) -> AppResult<Session> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Session {session_id}")))
    }

    async fn revoke(&self, session: &Session, actor: &str, origin: &RequestOrigin) -> AppResult<()> {
        if self.sessions.revoke_session(&session.session_id).await? {
            tracing::info!(session_id = %session.session_id, user_id = %session.user_id, "Session terminated");
            self.audit
                .append(
                    AuditEntry::new(AuditAction::SessionTerminated, "session", &session.session_id)
                        .with_actor(actor)
                        .with_change(json!({ "revoked": false }), json!({ "revoked": true }))
                        .with_origin(origin),
                )
                .await;
        }
        Ok(())
    }
}
