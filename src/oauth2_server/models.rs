// ABOUTME: Request and response types for the authorization pipeline
// ABOUTME: Registration input, authorize and token requests, token responses
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use identity_core::models::{ClientType, PendingConsent, ScopeSet};
use serde::{Deserialize, Serialize};

/// Client registration input
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Human-readable client name
    pub client_name: String,
    /// Exact-match redirect URIs
    pub redirect_uris: Vec<String>,
    /// Confidential clients receive a secret; public clients do not
    pub client_type: ClientType,
    /// Trusted first-party clients skip the consent prompt
    #[serde(default)]
    pub trusted: bool,
}

/// Authorization request for an already-authenticated user
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    /// Client identifier
    pub client_id: String,
    /// Must exactly match a registered URI
    pub redirect_uri: String,
    /// Space-separated requested scopes
    pub scope: Option<String>,
    /// Opaque client state echoed back
    pub state: Option<String>,
    /// Authenticated user
    pub user_id: String,
    /// Device description for the session
    pub device_info: String,
}

impl AuthorizeRequest {
    /// Requested scopes, `openid` when none given
    #[must_use]
    pub fn requested_scopes(&self) -> ScopeSet {
        match self.scope.as_deref().map(str::trim) {
            Some(scope) if !scope.is_empty() => ScopeSet::parse(scope),
            _ => ScopeSet::parse("openid"),
        }
    }
}

/// Token endpoint request (refresh grant)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// Must be `refresh_token`
    pub grant_type: String,
    /// Client identifier
    pub client_id: String,
    /// Client secret, confidential clients only
    pub client_secret: Option<String>,
    /// Refresh token being exchanged
    pub refresh_token: Option<String>,
}

/// Token set returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    /// Access token (JWT)
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Granted scopes
    pub scope: String,
    /// Rotating refresh token
    pub refresh_token: String,
    /// OIDC ID token, when `openid` was granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Session the tokens are bound to
    pub session_id: String,
    /// Client state from the authorize request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Result of an authorization attempt
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuthorizationOutcome {
    /// Consent already covered the request; tokens minted
    Granted(Box<TokenResponse>),
    /// The user must approve this pending request first
    ConsentRequired(Box<PendingConsent>),
}
