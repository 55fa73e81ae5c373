// ABOUTME: Narrow persistence traits for tokens, clients, consent, sessions, audit, and events
// ABOUTME: External collaborator seam; the in-memory backend is the reference implementation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Store Abstraction
//!
//! Each component depends on the smallest trait it needs. Implementations
//! must provide read-after-write consistency per record: once a revoking
//! write returns, every subsequent read on any worker observes it.
//!
//! Retries, if any, belong to the implementation's client. The core treats
//! every store error as [`ErrorCode::InternalError`](identity_core::errors::ErrorCode).

/// In-memory store backed by sharded concurrent maps
pub mod memory;
/// Periodic removal of expired and aged-out records
pub mod retention;

pub use memory::MemoryStore;
pub use retention::{spawn_retention_sweeper, RetentionPolicy, RetentionReport, StoreRetention};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use identity_core::errors::AppResult;
use identity_core::models::{
    AuditEntry, AuditFilter, Consent, OAuthClient, Session, TokenEvent, TokenRecord,
};
use identity_core::permissions::Role;

/// Persistence for stateful token records
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Store a newly issued token record
    async fn insert_token(&self, record: &TokenRecord) -> AppResult<()>;

    /// Fetch a token record by `jti`
    async fn get_token(&self, jti: &str) -> AppResult<Option<TokenRecord>>;

    /// Mark a token revoked; returns `true` only if this call flipped the flag
    async fn revoke_token(&self, jti: &str) -> AppResult<bool>;

    /// Unrevoked refresh tokens issued to `subject` for `client_id`
    async fn active_refresh_tokens(
        &self,
        subject: &str,
        client_id: &str,
    ) -> AppResult<Vec<TokenRecord>>;

    /// Unrevoked tokens bound to `session_id`
    async fn tokens_for_session(&self, session_id: &str) -> AppResult<Vec<TokenRecord>>;
}

/// Persistence for OAuth client registrations
#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// Store a new client; fails with `ResourceConflict` if the id exists
    async fn insert_client(&self, client: &OAuthClient) -> AppResult<()>;

    /// Fetch a client by id
    async fn get_client(&self, client_id: &str) -> AppResult<Option<OAuthClient>>;

    /// Replace the secret hash in one atomic write, only if the stored hash
    /// still equals `expected_hash`
    ///
    /// Fails with `ResourceNotFound` for an unknown client and
    /// `ResourceConflict` when another rotation won the race.
    async fn swap_secret_hash(
        &self,
        client_id: &str,
        expected_hash: &str,
        new_hash: &str,
        rotated_at: DateTime<Utc>,
    ) -> AppResult<OAuthClient>;

    /// Flip `is_active` atomically and return the updated client
    async fn toggle_active(&self, client_id: &str) -> AppResult<OAuthClient>;

    /// All registered clients
    async fn list_clients(&self) -> AppResult<Vec<OAuthClient>>;
}

/// Persistence for consent records
#[async_trait]
pub trait ConsentRepository: Send + Sync {
    /// Active consent for the pair, if any
    async fn active_consent(&self, user_id: &str, client_id: &str) -> AppResult<Option<Consent>>;

    /// Consent by identifier, active or revoked
    async fn get_consent(&self, consent_id: &str) -> AppResult<Option<Consent>>;

    /// Store `consent` as the pair's current record, replacing whatever was there
    async fn put_consent(&self, consent: &Consent) -> AppResult<()>;

    /// Set `revoked_at` on the pair's active consent
    ///
    /// Fails with `ResourceNotFound` when no active consent exists.
    async fn revoke_consent(
        &self,
        user_id: &str,
        client_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> AppResult<Consent>;

    /// Every consent record (active or revoked) belonging to a user
    async fn consents_for_user(&self, user_id: &str) -> AppResult<Vec<Consent>>;
}

/// Persistence for device sessions
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Store a new session
    async fn insert_session(&self, session: &Session) -> AppResult<()>;

    /// Fetch a session by id
    async fn get_session(&self, session_id: &str) -> AppResult<Option<Session>>;

    /// Mark a session revoked; returns `true` only if this call flipped the flag
    async fn revoke_session(&self, session_id: &str) -> AppResult<bool>;

    /// Update `last_seen_at`
    async fn touch_session(&self, session_id: &str, seen_at: DateTime<Utc>) -> AppResult<()>;

    /// Every session belonging to a user
    async fn sessions_for_user(&self, user_id: &str) -> AppResult<Vec<Session>>;
}

/// Append-only audit sink
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append one entry
    async fn append_entry(&self, entry: &AuditEntry) -> AppResult<()>;

    /// Entries matching `filter`, newest first
    async fn query_entries(&self, filter: &AuditFilter) -> AppResult<Vec<AuditEntry>>;
}

/// Token event feed read by anomaly detection and statistics
#[async_trait]
pub trait TokenEventRepository: Send + Sync {
    /// Append one event
    async fn record_event(&self, event: &TokenEvent) -> AppResult<()>;

    /// Events with `from <= occurred_at < to`
    async fn events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<TokenEvent>>;
}

/// Bulk removal of records that no read path needs anymore
///
/// Each method returns how many records it removed.
#[async_trait]
pub trait RetentionRepository: Send + Sync {
    /// Drop token records whose `expires_at` is before `cutoff`
    async fn purge_tokens_expired_before(&self, cutoff: DateTime<Utc>) -> AppResult<usize>;

    /// Drop sessions whose `expires_at` is before `cutoff`
    async fn purge_sessions_expired_before(&self, cutoff: DateTime<Utc>) -> AppResult<usize>;

    /// Drop token events with `occurred_at` before `cutoff`
    async fn purge_events_before(&self, cutoff: DateTime<Utc>) -> AppResult<usize>;

    /// Drop audit entries with `timestamp` before `cutoff`
    async fn purge_audit_before(&self, cutoff: DateTime<Utc>) -> AppResult<usize>;
}

/// Read-only view of user records owned by the surrounding application
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Role of an active user, `None` when unknown or disabled
    async fn role_of(&self, user_id: &str) -> AppResult<Option<Role>>;
}
