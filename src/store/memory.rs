// ABOUTME: In-memory implementation of every store trait using sharded concurrent maps
// ABOUTME: Used by tests and single-instance deployments; state is lost on restart
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::{
    AuditRepository, ClientRepository, ConsentRepository, RetentionRepository,
    SessionRepository, TokenEventRepository, TokenRepository, UserDirectory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use identity_core::errors::{AppError, AppResult};
use identity_core::models::{
    AuditEntry, AuditFilter, Consent, OAuthClient, Session, TokenEvent, TokenRecord, TokenType,
};
use identity_core::permissions::Role;
use std::sync::{Arc, RwLock};

/// Process-local store
///
/// `DashMap` shard locks are only held for the duration of a single
/// synchronous map operation, never across an `.await`. Append-only logs
/// sit behind a `std::sync::RwLock` for the same reason.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tokens: Arc<DashMap<String, TokenRecord>>,
    clients: Arc<DashMap<String, OAuthClient>>,
    /// Current consent per `(user_id, client_id)`
    consents: Arc<DashMap<(String, String), Consent>>,
    sessions: Arc<DashMap<String, Session>>,
    audit: Arc<RwLock<Vec<AuditEntry>>>,
    events: Arc<RwLock<Vec<TokenEvent>>>,
    users: Arc<DashMap<String, Role>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user role (stands in for the external user directory)
    pub fn upsert_user(&self, user_id: impl Into<String>, role: Role) {
        self.users.insert(user_id.into(), role);
    }

    /// Remove a user from the directory
    pub fn remove_user(&self, user_id: &str) {
        self.users.remove(user_id);
    }

    fn poisoned(what: &str) -> AppError {
        AppError::internal(format!("{what} lock poisoned"))
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn insert_token(&self, record: &TokenRecord) -> AppResult<()> {
        match self.tokens.entry(record.jti.clone()) {
            Entry::Occupied(_) => Err(AppError::conflict(format!(
                "Token {} already stored",
                record.jti
            ))),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn get_token(&self, jti: &str) -> AppResult<Option<TokenRecord>> {
        Ok(self.tokens.get(jti).map(|r| r.value().clone()))
    }

    async fn revoke_token(&self, jti: &str) -> AppResult<bool> {
        Ok(self.tokens.get_mut(jti).is_some_and(|mut record| {
            let flipped = !record.revoked;
            record.revoked = true;
            flipped
        }))
    }

    async fn active_refresh_tokens(
        &self,
        subject: &str,
        client_id: &str,
    ) -> AppResult<Vec<TokenRecord>> {
        Ok(self
            .tokens
            .iter()
            .filter(|r| {
                r.token_type == TokenType::Refresh
                    && !r.revoked
                    && r.subject == subject
                    && r.client_id == client_id
            })
            .map(|r| r.value().clone())
            .collect())
    }

    async fn tokens_for_session(&self, session_id: &str) -> AppResult<Vec<TokenRecord>> {
        Ok(self
            .tokens
            .iter()
            .filter(|r| !r.revoked && r.session_id.as_deref() == Some(session_id))
            .map(|r| r.value().clone())
            .collect())
    }
}

#[async_trait]
impl ClientRepository for MemoryStore {
    async fn insert_client(&self, client: &OAuthClient) -> AppResult<()> {
        match self.clients.entry(client.client_id.clone()) {
            Entry::Occupied(_) => Err(AppError::conflict(format!(
                "Client {} already registered",
                client.client_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(client.clone());
                Ok(())
            }
        }
    }

    async fn get_client(&self, client_id: &str) -> AppResult<Option<OAuthClient>> {
        Ok(self.clients.get(client_id).map(|c| c.value().clone()))
    }

    async fn swap_secret_hash(
        &self,
        client_id: &str,
        expected_hash: &str,
        new_hash: &str,
        rotated_at: DateTime<Utc>,
    ) -> AppResult<OAuthClient> {
        let mut client = self
            .clients
            .get_mut(client_id)
            .ok_or_else(|| AppError::not_found(format!("Client {client_id}")))?;

        if client.client_secret_hash.as_deref() != Some(expected_hash) {
            return Err(AppError::conflict(format!(
                "Secret for client {client_id} was rotated concurrently"
            )));
        }
        client.client_secret_hash = Some(new_hash.to_owned());
        client.secret_rotated_at = Some(rotated_at);
        Ok(client.clone())
    }

    async fn toggle_active(&self, client_id: &str) -> AppResult<OAuthClient> {
        let mut client = self
            .clients
            .get_mut(client_id)
            .ok_or_else(|| AppError::not_found(format!("Client {client_id}")))?;
        client.is_active = !client.is_active;
        Ok(client.clone())
    }

    async fn list_clients(&self) -> AppResult<Vec<OAuthClient>> {
        Ok(self.clients.iter().map(|c| c.value().clone()).collect())
    }
}

#[async_trait]
impl ConsentRepository for MemoryStore {
    async fn active_consent(&self, user_id: &str, client_id: &str) -> AppResult<Option<Consent>> {
        Ok(self
            .consents
            .get(&(user_id.to_owned(), client_id.to_owned()))
            .filter(|c| c.is_active())
            .map(|c| c.value().clone()))
    }

    async fn get_consent(&self, consent_id: &str) -> AppResult<Option<Consent>> {
        Ok(self
            .consents
            .iter()
            .find(|c| c.id == consent_id)
            .map(|c| c.value().clone()))
    }

    async fn put_consent(&self, consent: &Consent) -> AppResult<()> {
        self.consents.insert(
            (consent.user_id.clone(), consent.client_id.clone()),
            consent.clone(),
        );
        Ok(())
    }

    async fn revoke_consent(
        &self,
        user_id: &str,
        client_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> AppResult<Consent> {
        let mut consent = self
            .consents
            .get_mut(&(user_id.to_owned(), client_id.to_owned()))
            .filter(|c| c.is_active())
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "Active consent for user {user_id} and client {client_id}"
                ))
            })?;
        consent.revoked_at = Some(revoked_at);
        Ok(consent.clone())
    }

    async fn consents_for_user(&self, user_id: &str) -> AppResult<Vec<Consent>> {
        Ok(self
            .consents
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.value().clone())
            .collect())
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn insert_session(&self, session: &Session) -> AppResult<()> {
        match self.sessions.entry(session.session_id.clone()) {
            Entry::Occupied(_) => Err(AppError::conflict(format!(
                "Session {} already exists",
                session.session_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(())
            }
        }
    }

    async fn get_session(&self, session_id: &str) -> AppResult<Option<Session>> {
        Ok(self.sessions.get(session_id).map(|s| s.value().clone()))
    }

    async fn revoke_session(&self, session_id: &str) -> AppResult<bool> {
        Ok(self.sessions.get_mut(session_id).is_some_and(|mut session| {
            let flipped = !session.revoked;
            session.revoked = true;
            flipped
        }))
    }

    async fn touch_session(&self, session_id: &str, seen_at: DateTime<Utc>) -> AppResult<()> {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            if seen_at > session.last_seen_at {
                session.last_seen_at = seen_at;
            }
        }
        Ok(())
    }

    async fn sessions_for_user(&self, user_id: &str) -> AppResult<Vec<Session>> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.value().clone())
            .collect())
    }
}

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn append_entry(&self, entry: &AuditEntry) -> AppResult<()> {
        self.audit
            .write()
            .map_err(|_| Self::poisoned("audit"))?
            .push(entry.clone());
        Ok(())
    }

    async fn query_entries(&self, filter: &AuditFilter) -> AppResult<Vec<AuditEntry>> {
        let entries = self.audit.read().map_err(|_| Self::poisoned("audit"))?;
        let matching = entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        drop(entries);
        Ok(matching)
    }
}

#[async_trait]
impl TokenEventRepository for MemoryStore {
    async fn record_event(&self, event: &TokenEvent) -> AppResult<()> {
        self.events
            .write()
            .map_err(|_| Self::poisoned("token event"))?
            .push(event.clone());
        Ok(())
    }

    async fn events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<TokenEvent>> {
        let events = self
            .events
            .read()
            .map_err(|_| Self::poisoned("token event"))?;
        let window = events
            .iter()
            .filter(|e| e.occurred_at >= from && e.occurred_at < to)
            .cloned()
            .collect();
        drop(events);
        Ok(window)
    }
}

#[async_trait]
impl RetentionRepository for MemoryStore {
    async fn purge_tokens_expired_before(&self, cutoff: DateTime<Utc>) -> AppResult<usize> {
        let mut removed = 0;
        self.tokens.retain(|_, record| {
            let keep = record.expires_at >= cutoff;
            removed += usize::from(!keep);
            keep
        });
        Ok(removed)
    }

    async fn purge_sessions_expired_before(&self, cutoff: DateTime<Utc>) -> AppResult<usize> {
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let keep = session.expires_at >= cutoff;
            removed += usize::from(!keep);
            keep
        });
        Ok(removed)
    }

    async fn purge_events_before(&self, cutoff: DateTime<Utc>) -> AppResult<usize> {
        let mut events = self
            .events
            .write()
            .map_err(|_| Self::poisoned("token event"))?;
        let before = events.len();
        events.retain(|e| e.occurred_at >= cutoff);
        let removed = before - events.len();
        drop(events);
        Ok(removed)
    }

    async fn purge_audit_before(&self, cutoff: DateTime<Utc>) -> AppResult<usize> {
        let mut entries = self.audit.write().map_err(|_| Self::poisoned("audit"))?;
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        let removed = before - entries.len();
        drop(entries);
        Ok(removed)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn role_of(&self, user_id: &str) -> AppResult<Option<Role>> {
        Ok(self.users.get(user_id).map(|r| *r.value()))
    }
}
