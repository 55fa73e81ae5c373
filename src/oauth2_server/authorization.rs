// ABOUTME: Authorization pipeline tying rate limits, clients, consent, tokens, and sessions together
// ABOUTME: Handles authorize, consent approval, refresh token rotation, and logout
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Authorization Server
//!
//! `authorize` runs rate limit, client and redirect URI validation, consent
//! check, token minting, and session binding in that order. Untrusted clients
//! without a covering consent get a [`PendingConsent`] that the user approves
//! through `approve_consent`. Refresh tokens rotate on every use.

use super::client_registry::ClientRegistry;
use super::consent::ConsentStore;
use super::discovery::GRANT_TYPES;
use super::models::{AuthorizationOutcome, AuthorizeRequest, TokenRequest, TokenResponse};
use crate::rate_limiting::{AuthEndpoint, RateLimiter};
use crate::security::AuditLog;
use crate::sessions::SessionManager;
use crate::tokens::{TokenGrant, TokenIssuer};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use identity_core::constants::sessions::PENDING_CONSENT_TTL_SECS;
use identity_core::errors::{AppError, AppResult};
use identity_core::models::{
    AuditAction, AuditEntry, OAuthClient, PendingConsent, RequestOrigin, ScopeSet, TokenType,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Address used as the rate limit key when the boundary could not see one
const UNKNOWN_CLIENT_IP: &str = "unknown";

/// Handles to every component the pipeline drives
pub struct AuthorizationServer {
    clients: Arc<ClientRegistry>,
    consents: Arc<ConsentStore>,
    issuer: Arc<TokenIssuer>,
    sessions: Arc<SessionManager>,
    rate_limiter: Arc<RateLimiter>,
    audit: AuditLog,
    pending: DashMap<String, PendingConsent>,
    pending_ttl: Duration,
}

impl AuthorizationServer {
    /// Wire the pipeline
    #[must_use]
    pub fn new(
        clients: Arc<ClientRegistry>,
        consents: Arc<ConsentStore>,
        issuer: Arc<TokenIssuer>,
        sessions: Arc<SessionManager>,
        rate_limiter: Arc<RateLimiter>,
        audit: AuditLog,
    ) -> Self {
        Self {
            clients,
            consents,
            issuer,
            sessions,
            rate_limiter,
            audit,
            pending: DashMap::new(),
            pending_ttl: Duration::seconds(PENDING_CONSENT_TTL_SECS),
        }
    }

    /// Override how long a pending consent stays approvable
    #[must_use]
    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    /// Authorize an authenticated user for a client
    ///
    /// # Errors
    ///
    /// Returns `RateLimitExceeded`, `ResourceNotFound` for an unknown client,
    /// `ClientInactive`, or `InvalidInput` for an unregistered redirect URI
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        origin: &RequestOrigin,
    ) -> AppResult<AuthorizationOutcome> {
        self.rate_limiter
            .enforce(
                AuthEndpoint::Authorize,
                client_ip(origin),
                Some(&request.user_id),
                origin,
            )
            .await?;

        let client = self.active_client(&request.client_id).await?;
        ClientRegistry::validate_redirect_uri(&client, &request.redirect_uri)?;

        let scopes = request.requested_scopes();
        if !client.trusted
            && !self
                .consents
                .check(&request.user_id, &client.client_id, &scopes)
                .await?
        {
            let pending = self.park(&client, request, scopes);
            tracing::debug!(
                pending_id = %pending.id,
                client_id = %client.client_id,
                "Authorization awaiting user consent"
            );
            return Ok(AuthorizationOutcome::ConsentRequired(Box::new(pending)));
        }

        let response = self
            .mint(
                &client,
                &request.user_id,
                &scopes,
                &request.device_info,
                request.state.clone(),
                origin,
            )
            .await?;
        Ok(AuthorizationOutcome::Granted(Box::new(response)))
    }

    /// Approve a pending consent owned by `user_id` and mint tokens
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown or expired request,
    /// `PermissionDenied` when it belongs to another user, and
    /// `ClientInactive` when the client was deactivated meanwhile
    pub async fn approve_consent(
        &self,
        pending_id: &str,
        user_id: &str,
        origin: &RequestOrigin,
    ) -> AppResult<TokenResponse> {
        let pending = self.take_pending(pending_id, user_id)?;
        let client = self.active_client(&pending.client_id).await?;

        self.consents
            .grant(user_id, &client.client_id, &pending.requested_scopes, origin)
            .await?;
        self.mint(
            &client,
            user_id,
            &pending.requested_scopes,
            &pending.device_info,
            pending.state,
            origin,
        )
        .await
    }

    /// Drop a pending consent the user declined
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown or expired request and
    /// `PermissionDenied` when it belongs to another user
    pub fn deny_consent(&self, pending_id: &str, user_id: &str) -> AppResult<()> {
        let pending = self.take_pending(pending_id, user_id)?;
        tracing::info!(pending_id = %pending.id, client_id = %pending.client_id, "Consent denied");
        Ok(())
    }

    /// Exchange a refresh token for a new access/refresh pair
    ///
    /// The presented refresh token is revoked before new tokens are minted,
    /// so replaying it fails with `TokenRevoked`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed request, `RateLimitExceeded`,
    /// client authentication failures, token verification failures, and
    /// `AuthInvalid` when the session or consent is no longer active
    pub async fn refresh(
        &self,
        request: &TokenRequest,
        origin: &RequestOrigin,
    ) -> AppResult<TokenResponse> {
        if !GRANT_TYPES.contains(&request.grant_type.as_str()) {
            return Err(AppError::invalid_input(format!(
                "Unsupported grant_type: {}",
                request.grant_type
            )));
        }
        let presented = request
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::invalid_input("refresh_token is required"))?;

        self.rate_limiter
            .enforce(
                AuthEndpoint::Token,
                client_ip(origin),
                Some(&request.client_id),
                origin,
            )
            .await?;

        let client = self
            .clients
            .authenticate(&request.client_id, request.client_secret.as_deref(), origin)
            .await?;
        let verified = self
            .issuer
            .verify_for_client(presented, &client.client_id, origin)
            .await?;
        let claims = verified.claims;
        if claims.typ != TokenType::Refresh {
            return Err(AppError::auth_invalid("Token is not a refresh token"));
        }

        let session_id = claims
            .sid
            .as_deref()
            .ok_or_else(|| AppError::auth_invalid("Refresh token is not bound to a session"))?;
        let session = self.sessions.validate(session_id).await?;
        if session.user_id != claims.sub {
            return Err(AppError::auth_invalid("Session does not belong to token subject"));
        }

        let scopes = claims.scopes();
        if !client.trusted
            && !self
                .consents
                .check(&claims.sub, &client.client_id, &scopes)
                .await?
        {
            return Err(AppError::auth_invalid("Consent for this client was revoked"));
        }

        // Only the request that flips the flag may mint; a concurrent replay loses
        if !self.issuer.revoke(&claims.jti).await? {
            tracing::warn!(jti = %claims.jti, client_id = %client.client_id, "Refresh token replay rejected");
            return Err(AppError::token_revoked());
        }

        let grant = TokenGrant {
            subject: claims.sub.clone(),
            client_id: client.client_id.clone(),
            scopes,
            session_id: Some(session.session_id.clone()),
        };
        let response = self.issue_set(&grant, None, origin).await?;

        self.audit
            .append(
                AuditEntry::new(AuditAction::TokenRefreshed, "session", &session.session_id)
                    .with_actor(&claims.sub)
                    .with_change(
                        json!({ "refresh_jti": claims.jti }),
                        json!({ "client_id": client.client_id, "scope": response.scope }),
                    )
                    .with_origin(origin),
            )
            .await;
        Ok(response)
    }

    /// End a session owned by `user_id` and revoke its refresh tokens
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown session and
    /// `PermissionDenied` when it belongs to another user
    pub async fn logout(
        &self,
        session_id: &str,
        user_id: &str,
        origin: &RequestOrigin,
    ) -> AppResult<usize> {
        self.sessions.terminate(session_id, user_id, origin).await?;
        let revoked = self.issuer.revoke_for_session(session_id).await?;
        tracing::info!(session_id = %session_id, refresh_tokens_revoked = revoked, "Logged out");
        Ok(revoked)
    }

    /// Pending consents currently held, expired ones excluded
    #[must_use]
    pub fn pending_count(&self) -> usize {
        let now = Utc::now();
        self.pending.iter().filter(|p| !p.is_expired(now)).count()
    }

    /// Drop expired pending consents; returns how many were removed
    pub fn purge_expired_pending(&self) -> usize {
        let now = Utc::now();
        let before = self.pending.len();
        self.pending.retain(|_, p| !p.is_expired(now));
        before.saturating_sub(self.pending.len())
    }

    async fn active_client(&self, client_id: &str) -> AppResult<OAuthClient> {
        let client = self.clients.get(client_id).await?;
        if !client.is_active {
            return Err(AppError::client_inactive(client_id));
        }
        Ok(client)
    }

    fn park(
        &self,
        client: &OAuthClient,
        request: &AuthorizeRequest,
        scopes: ScopeSet,
    ) -> PendingConsent {
        self.purge_expired_pending();
        let now = Utc::now();
        let pending = PendingConsent {
            id: Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            client_id: client.client_id.clone(),
            client_name: client.name.clone(),
            redirect_uri: request.redirect_uri.clone(),
            requested_scopes: scopes,
            state: request.state.clone(),
            device_info: request.device_info.clone(),
            created_at: now,
            expires_at: now + self.pending_ttl,
        };
        self.pending.insert(pending.id.clone(), pending.clone());
        pending
    }

    fn take_pending(&self, pending_id: &str, user_id: &str) -> AppResult<PendingConsent> {
        let Some((_, pending)) = self
            .pending
            .remove_if(pending_id, |_, p| p.user_id == user_id)
        else {
            if self.pending.contains_key(pending_id) {
                return Err(AppError::forbidden("Consent request belongs to another user"));
            }
            return Err(AppError::not_found(format!("Consent request {pending_id}")));
        };
        if pending.is_expired(Utc::now()) {
            return Err(AppError::not_found(format!(
                "Consent request {pending_id} has expired"
            )));
        }
        Ok(pending)
    }

    async fn mint(
        &self,
        client: &OAuthClient,
        user_id: &str,
        scopes: &ScopeSet,
        device_info: &str,
        state: Option<String>,
        origin: &RequestOrigin,
    ) -> AppResult<TokenResponse> {
        let session = self.sessions.create(user_id, device_info, origin).await?;
        let grant = TokenGrant {
            subject: user_id.to_owned(),
            client_id: client.client_id.clone(),
            scopes: scopes.clone(),
            session_id: Some(session.session_id.clone()),
        };
        let response = self.issue_set(&grant, state, origin).await?;

        self.audit
            .append(
                AuditEntry::new(AuditAction::TokensIssued, "session", &session.session_id)
                    .with_actor(user_id)
                    .with_change(
                        serde_json::Value::Null,
                        json!({
                            "client_id": client.client_id,
                            "scope": response.scope,
                            "id_token": response.id_token.is_some(),
                        }),
                    )
                    .with_origin(origin),
            )
            .await;
        Ok(response)
    }

    async fn issue_set(
        &self,
        grant: &TokenGrant,
        state: Option<String>,
        origin: &RequestOrigin,
    ) -> AppResult<TokenResponse> {
        let access = self.issuer.issue(grant, TokenType::Access, origin).await?;
        let refresh = self.issuer.issue(grant, TokenType::Refresh, origin).await?;
        let id_token = if grant.scopes.iter().any(|s| s == "openid") {
            Some(self.issuer.issue(grant, TokenType::Id, origin).await?.token)
        } else {
            None
        };

        Ok(TokenResponse {
            access_token: access.token,
            token_type: "Bearer".to_owned(),
            expires_in: self.issuer.config().access_ttl.num_seconds(),
            scope: grant.scopes.to_claim(),
            refresh_token: refresh.token,
            id_token,
            session_id: grant.session_id.clone().unwrap_or_default(),
            state,
        })
    }
}

fn client_ip(origin: &RequestOrigin) -> &str {
    origin.ip.as_deref().unwrap_or(UNKNOWN_CLIENT_IP)
}
