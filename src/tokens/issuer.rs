// ABOUTME: Mints and verifies RS256 tokens and feeds the token event stream
// ABOUTME: Refresh tokens are stateful and re-checked in the store on every verification
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::claims::Claims;
use super::statistics::{TokenStatistics, TokenStatisticsQuery};
use crate::keys::KeyManager;
use crate::store::{TokenEventRepository, TokenRepository};
use chrono::{DateTime, Duration, Utc};
use identity_core::constants::{service_names, token_ttl};
use identity_core::errors::{AppError, AppResult};
use identity_core::models::{
    RequestOrigin, ScopeSet, TokenEvent, TokenEventKind, TokenRecord, TokenType,
};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Issuer URL and per-type lifetimes
#[derive(Debug, Clone)]
pub struct TokenIssuerConfig {
    /// `iss` claim
    pub issuer: String,
    /// Access token lifetime
    pub access_ttl: Duration,
    /// ID token lifetime
    pub id_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_ttl: Duration,
}

impl Default for TokenIssuerConfig {
    fn default() -> Self {
        Self {
            issuer: service_names::DEFAULT_ISSUER.to_owned(),
            access_ttl: Duration::seconds(token_ttl::ACCESS_SECS),
            id_ttl: Duration::seconds(token_ttl::ID_SECS),
            refresh_ttl: Duration::seconds(token_ttl::REFRESH_SECS),
        }
    }
}

impl TokenIssuerConfig {
    /// Lifetime for a token type
    #[must_use]
    pub const fn ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Id => self.id_ttl,
            TokenType::Refresh => self.refresh_ttl,
        }
    }
}

/// Who a token is for and what it may do
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// User id
    pub subject: String,
    /// Client id, becomes `aud`
    pub client_id: String,
    /// Granted scopes
    pub scopes: ScopeSet,
    /// Session to bind the token to
    pub session_id: Option<String>,
}

/// Serialized token plus its record
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact JWS
    pub token: String,
    /// Metadata; persisted for refresh tokens
    pub record: TokenRecord,
}

/// Result of a successful verification
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    /// Decoded claims
    pub claims: Claims,
    /// Key that signed the token
    pub kid: String,
}

/// Token minting and verification
pub struct TokenIssuer {
    keys: Arc<KeyManager>,
    tokens: Arc<dyn TokenRepository>,
    events: Arc<dyn TokenEventRepository>,
    config: TokenIssuerConfig,
}

impl TokenIssuer {
    /// Create an issuer over the given key manager and stores
    #[must_use]
    pub fn new(
        keys: Arc<KeyManager>,
        tokens: Arc<dyn TokenRepository>,
        events: Arc<dyn TokenEventRepository>,
        config: TokenIssuerConfig,
    ) -> Self {
        Self {
            keys,
            tokens,
            events,
            config,
        }
    }

    /// Issuer configuration
    #[must_use]
    pub const fn config(&self) -> &TokenIssuerConfig {
        &self.config
    }

    /// Mint a token of `token_type` signed with the active key
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if signing or persisting a refresh token fails
    pub async fn issue(
        &self,
        grant: &TokenGrant,
        token_type: TokenType,
        origin: &RequestOrigin,
    ) -> AppResult<IssuedToken> {
        self.issue_at(grant, token_type, Utc::now(), origin).await
    }

    /// [`issue`](Self::issue) with an explicit issue time
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if signing or persisting a refresh token fails
    pub async fn issue_at(
        &self,
        grant: &TokenGrant,
        token_type: TokenType,
        issued_at: DateTime<Utc>,
        origin: &RequestOrigin,
    ) -> AppResult<IssuedToken> {
        let ttl = self.config.ttl(token_type);
        let expires_at = issued_at + ttl;
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            iss: self.config.issuer.clone(),
            sub: grant.subject.clone(),
            aud: grant.client_id.clone(),
            scope: grant.scopes.to_claim(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: jti.clone(),
            typ: token_type,
            sid: grant.session_id.clone(),
        };

        let key = self.keys.signing_key(ttl.num_seconds());
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid().to_owned());
        let token = encode(&header, &claims, key.pair().encoding_key())
            .map_err(|e| AppError::internal(format!("Failed to sign {token_type} token: {e}")))?;

        let record = TokenRecord {
            jti,
            subject: grant.subject.clone(),
            client_id: grant.client_id.clone(),
            scopes: grant.scopes.clone(),
            token_type,
            issued_at,
            expires_at,
            signing_kid: key.kid().to_owned(),
            session_id: grant.session_id.clone(),
            revoked: false,
        };
        if token_type.is_stateful() {
            self.tokens.insert_token(&record).await?;
        }

        debug!(
            jti = %record.jti,
            token_type = %token_type,
            client_id = %record.client_id,
            kid = %record.signing_kid,
            "Token issued"
        );
        self.record(TokenEvent {
            id: Uuid::new_v4(),
            kind: TokenEventKind::Issued,
            subject: Some(record.subject.clone()),
            client_id: Some(record.client_id.clone()),
            jti: Some(record.jti.clone()),
            token_type: Some(token_type),
            ip: origin.ip.clone(),
            user_agent: origin.user_agent.clone(),
            occurred_at: issued_at,
        })
        .await;

        Ok(IssuedToken { token, record })
    }

    /// Verify a token against the published keys at the current time
    ///
    /// # Errors
    ///
    /// See [`verify_at`](Self::verify_at)
    pub async fn verify(&self, token: &str, origin: &RequestOrigin) -> AppResult<VerifiedToken> {
        self.verify_at(token, Utc::now(), origin).await
    }

    /// Verify signature, issuer, audience presence, and expiry as of `now`
    ///
    /// Refresh tokens additionally require an unrevoked store record.
    ///
    /// # Errors
    ///
    /// - `TokenSignatureInvalid` for malformed tokens or bad signatures
    /// - `UnknownSigningKey` when the `kid` is not published
    /// - `TokenExpired` once `now >= exp`
    /// - `TokenRevoked` for revoked or unknown refresh tokens
    pub async fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
        origin: &RequestOrigin,
    ) -> AppResult<VerifiedToken> {
        let outcome = self.check_token(token, now).await;

        let (kind, claims) = match &outcome {
            Ok(verified) => (TokenEventKind::Validated, Some(&verified.claims)),
            Err((claims, err)) => {
                debug!(code = ?err.code, "Token verification failed: {}", err.message);
                (TokenEventKind::ValidationFailed, claims.as_ref())
            }
        };
        self.record(TokenEvent {
            id: Uuid::new_v4(),
            kind,
            subject: claims.map(|c| c.sub.clone()),
            client_id: claims.map(|c| c.aud.clone()),
            jti: claims.map(|c| c.jti.clone()),
            token_type: claims.map(|c| c.typ),
            ip: origin.ip.clone(),
            user_agent: origin.user_agent.clone(),
            occurred_at: now,
        })
        .await;

        outcome.map_err(|(_, err)| err)
    }

    /// Verify and additionally require `aud == client_id`
    ///
    /// # Errors
    ///
    /// Everything [`verify`](Self::verify) returns, plus `AuthInvalid` on an
    /// audience mismatch
    pub async fn verify_for_client(
        &self,
        token: &str,
        client_id: &str,
        origin: &RequestOrigin,
    ) -> AppResult<VerifiedToken> {
        let verified = self.verify(token, origin).await?;
        if verified.claims.aud != client_id {
            return Err(AppError::auth_invalid(
                "Token was not issued to this client",
            ));
        }
        Ok(verified)
    }

    /// Revoke a stateful token by `jti`; unknown or already-revoked is success
    ///
    /// Returns `true` only for the call that actually flipped the flag.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the store fails
    pub async fn revoke(&self, jti: &str) -> AppResult<bool> {
        let Some(record) = self.tokens.get_token(jti).await? else {
            return Ok(false);
        };
        let revoked = self.tokens.revoke_token(jti).await?;
        if revoked {
            debug!(jti = %jti, "Token revoked");
            self.record(TokenEvent {
                id: Uuid::new_v4(),
                kind: TokenEventKind::Revoked,
                subject: Some(record.subject),
                client_id: Some(record.client_id),
                jti: Some(record.jti),
                token_type: Some(record.token_type),
                ip: None,
                user_agent: None,
                occurred_at: Utc::now(),
            })
            .await;
        }
        Ok(revoked)
    }

    /// Revoke every outstanding refresh token for a (user, client) pair
    ///
    /// Returns how many tokens this call revoked; tokens revoked concurrently
    /// by someone else are not counted.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the store fails
    pub async fn revoke_for_pair(&self, subject: &str, client_id: &str) -> AppResult<usize> {
        let outstanding = self.tokens.active_refresh_tokens(subject, client_id).await?;
        self.revoke_all(&outstanding).await
    }

    /// Revoke every outstanding stateful token bound to a session
    ///
    /// Counts only the tokens this call revoked.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the store fails
    pub async fn revoke_for_session(&self, session_id: &str) -> AppResult<usize> {
        let outstanding = self.tokens.tokens_for_session(session_id).await?;
        self.revoke_all(&outstanding).await
    }

    async fn revoke_all(&self, records: &[TokenRecord]) -> AppResult<usize> {
        let mut revoked = 0;
        for record in records {
            if self.revoke(&record.jti).await? {
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    /// Aggregate token counts over a date range
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an inverted range and `InternalError` when
    /// the event feed cannot be read
    pub async fn statistics(&self, query: &TokenStatisticsQuery) -> AppResult<TokenStatistics> {
        let (start, end) = query.resolve(Utc::now())?;
        let events = self.events.events_between(start, end).await?;
        Ok(TokenStatistics::aggregate(
            &events,
            start,
            end,
            query.client_id.as_deref(),
        ))
    }

    /// Validation without side effects; on failure, returns whatever claims
    /// were decoded so the event can still be attributed
    async fn check_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken, Rejection> {
        let header = decode_header(token)
            .map_err(|e| reject(AppError::signature_invalid(format!("Malformed token: {e}"))))?;
        if header.alg != Algorithm::RS256 {
            return Err(reject(AppError::signature_invalid(format!(
                "Unsupported algorithm {:?}",
                header.alg
            ))));
        }
        let kid = header
            .kid
            .ok_or_else(|| reject(AppError::signature_invalid("Token header missing kid")))?;
        let key = self.keys.verification_key(&kid).map_err(reject)?;

        let mut validation = Validation::new(Algorithm::RS256);
        // Expiry is checked below against the caller's clock
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub", "aud"]);
        validation.set_issuer(&[&self.config.issuer]);

        let claims = decode::<Claims>(token, key.pair().decoding_key(), &validation)
            .map_err(|e| reject(map_jwt_error(&e)))?
            .claims;

        if claims.aud.is_empty() {
            return Err((Some(claims), AppError::auth_invalid("Token has no audience")));
        }
        if now.timestamp() >= claims.exp {
            let expired_at = claims.expires_at();
            return Err((Some(claims), AppError::token_expired(expired_at)));
        }

        if claims.typ.is_stateful() {
            match self.tokens.get_token(&claims.jti).await {
                Ok(Some(record)) if !record.revoked => {}
                Ok(_) => return Err((Some(claims), AppError::token_revoked())),
                Err(e) => return Err((Some(claims), e)),
            }
        }

        Ok(VerifiedToken { claims, kid })
    }

    /// Event feed writes are best effort; verification outcome never depends on them
    async fn record(&self, event: TokenEvent) {
        if let Err(e) = self.events.record_event(&event).await {
            warn!(
                kind = ?event.kind,
                error = %e,
                "Failed to record token event"
            );
        }
    }
}

/// A failed check plus any claims decoded before it failed
type Rejection = (Option<Claims>, AppError);

fn reject(error: AppError) -> Rejection {
    (None, error)
}

fn map_jwt_error(error: &jsonwebtoken::errors::Error) -> AppError {
    match error.kind() {
        ErrorKind::InvalidSignature => AppError::signature_invalid("Token signature does not verify"),
        ErrorKind::InvalidIssuer => AppError::auth_invalid("Token issuer mismatch"),
        ErrorKind::MissingRequiredClaim(claim) => {
            AppError::signature_invalid(format!("Token missing required claim {claim}"))
        }
        _ => AppError::signature_invalid(format!("Malformed token: {error}")),
    }
}
