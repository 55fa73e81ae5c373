// ABOUTME: JWT claim set shared by access, ID, and refresh tokens
// ABOUTME: The typ claim distinguishes token kinds; sid binds a token to a session
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use identity_core::models::{ScopeSet, TokenType};
use serde::{Deserialize, Serialize};

/// Registered and private claims carried by every token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer URL
    pub iss: String,
    /// User id
    pub sub: String,
    /// Client id the token was minted for
    pub aud: String,
    /// Space-separated scopes
    pub scope: String,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
    /// Unique token id
    pub jti: String,
    /// Token kind
    pub typ: TokenType,
    /// Session the token is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

impl Claims {
    /// Parsed scope claim
    #[must_use]
    pub fn scopes(&self) -> ScopeSet {
        ScopeSet::parse(&self.scope)
    }

    /// Expiry as a timestamp; out-of-range values collapse to the epoch
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}
