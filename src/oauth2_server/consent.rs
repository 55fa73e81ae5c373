// ABOUTME: Per-(user, client) consent grants with cascading refresh token revocation
// ABOUTME: Revocation is terminal; a later grant starts a new record
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::security::AuditLog;
use crate::store::ConsentRepository;
use crate::tokens::TokenIssuer;
use chrono::Utc;
use identity_core::errors::{AppError, AppResult};
use identity_core::models::{AuditAction, AuditEntry, Consent, RequestOrigin, ScopeSet};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Consent records and their revocation
pub struct ConsentStore {
    consents: Arc<dyn ConsentRepository>,
    issuer: Arc<TokenIssuer>,
    audit: AuditLog,
}

impl ConsentStore {
    /// Create a consent store
    #[must_use]
    pub fn new(
        consents: Arc<dyn ConsentRepository>,
        issuer: Arc<TokenIssuer>,
        audit: AuditLog,
    ) -> Self {
        Self {
            consents,
            issuer,
            audit,
        }
    }

    /// Whether an active consent already covers every requested scope
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the store fails
    pub async fn check(
        &self,
        user_id: &str,
        client_id: &str,
        requested: &ScopeSet,
    ) -> AppResult<bool> {
        Ok(self
            .consents
            .active_consent(user_id, client_id)
            .await?
            .is_some_and(|c| c.granted_scopes.covers(requested)))
    }

    /// Record a grant
    ///
    /// An active consent for the pair is widened to the union of old and new
    /// scopes. Otherwise a fresh record with a new id supersedes any revoked
    /// one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty scope set and `InternalError` when
    /// the store fails
    pub async fn grant(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: &ScopeSet,
        origin: &RequestOrigin,
    ) -> AppResult<Consent> {
        if scopes.is_empty() {
            return Err(AppError::invalid_input("Cannot grant an empty scope set"));
        }

        let now = Utc::now();
        let previous = self.consents.active_consent(user_id, client_id).await?;
        let consent = match &previous {
            Some(active) => Consent {
                granted_scopes: ScopeSet::from_iter_str(
                    active.granted_scopes.iter().chain(scopes.iter()),
                ),
                granted_at: now,
                ..active.clone()
            },
            None => Consent {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_owned(),
                client_id: client_id.to_owned(),
                granted_scopes: scopes.clone(),
                granted_at: now,
                revoked_at: None,
            },
        };
        self.consents.put_consent(&consent).await?;

        self.audit
            .append(
                AuditEntry::new(AuditAction::ConsentGranted, "consent", &consent.id)
                    .with_actor(user_id)
                    .with_change(
                        json!({ "granted_scopes": previous.map(|p| p.granted_scopes) }),
                        json!({ "client_id": client_id, "granted_scopes": consent.granted_scopes }),
                    )
                    .with_origin(origin),
            )
            .await;
        Ok(consent)
    }

    /// Revoke the pair's active consent and every refresh token issued under it
    ///
    /// Callers must have checked that the requester is the consenting user.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` when no active consent exists
    pub async fn revoke(
        &self,
        user_id: &str,
        client_id: &str,
        origin: &RequestOrigin,
    ) -> AppResult<Consent> {
        let revoked = self
            .consents
            .revoke_consent(user_id, client_id, Utc::now())
            .await?;
        let cascaded = self.issuer.revoke_for_pair(user_id, client_id).await?;

        tracing::info!(
            consent_id = %revoked.id,
            client_id = %client_id,
            refresh_tokens_revoked = cascaded,
            "Consent revoked"
        );
        self.audit
            .append(
                AuditEntry::new(AuditAction::ConsentRevoked, "consent", &revoked.id)
                    .with_actor(user_id)
                    .with_change(
                        json!({ "revoked_at": null }),
                        json!({
                            "revoked_at": revoked.revoked_at,
                            "refresh_tokens_revoked": cascaded,
                        }),
                    )
                    .with_origin(origin),
            )
            .await;
        Ok(revoked)
    }

    /// Revoke by consent id on behalf of `requesting_user`
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown or already revoked consent
    /// and `PermissionDenied` when the consent belongs to someone else
    pub async fn revoke_by_id(
        &self,
        consent_id: &str,
        requesting_user: &str,
        origin: &RequestOrigin,
    ) -> AppResult<Consent> {
        let consent = self
            .consents
            .get_consent(consent_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Consent {consent_id}")))?;
        if consent.user_id != requesting_user {
            tracing::warn!(consent_id = %consent_id, requester = %requesting_user, "Consent revocation by non-owner refused");
            return Err(AppError::forbidden("Consent belongs to another user"));
        }
        if !consent.is_active() {
            return Err(AppError::not_found(format!("Active consent {consent_id}")));
        }
        self.revoke(&consent.user_id, &consent.client_id, origin)
            .await
    }

    /// Every consent record for a user, newest grant first
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the store fails
    pub async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<Consent>> {
        let mut consents = self.consents.consents_for_user(user_id).await?;
        consents.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
        Ok(consents)
    }
}
