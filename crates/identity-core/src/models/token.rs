// ABOUTME: Token records, token types, and the token event feed model
// ABOUTME: Refresh tokens are persisted; access and ID tokens validate statelessly
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::AppError;

/// Kind of token minted by the issuer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived bearer token for resource access
    Access,
    /// OIDC identity assertion
    Id,
    /// Long-lived stateful credential for minting access tokens
    Refresh,
}

impl TokenType {
    /// Whether validation requires a store round-trip
    #[must_use]
    pub const fn is_stateful(self) -> bool {
        matches!(self, Self::Refresh)
    }

    /// Wire name used in the `typ` claim
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Id => "id",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(Self::Access),
            "id" => Ok(Self::Id),
            "refresh" => Ok(Self::Refresh),
            other => Err(AppError::invalid_input(format!(
                "Unknown token type: {other}"
            ))),
        }
    }
}

/// Space-delimited OAuth scope set, kept sorted for stable claims
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Parse a space-delimited scope string, ignoring repeated whitespace
    #[must_use]
    pub fn parse(scope: &str) -> Self {
        Self(scope.split_whitespace().map(str::to_owned).collect())
    }

    /// Build from any iterator of scope names
    pub fn from_iter_str<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(scopes.into_iter().map(Into::into).collect())
    }

    /// True if every scope in `other` is present here
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        other.0.is_subset(&self.0)
    }

    /// Number of scopes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no scope is present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate scope names in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Render as the space-delimited `scope` claim
    #[must_use]
    pub fn to_claim(&self) -> String {
        self.iter().collect::<Vec<_>>().join(" ")
    }
}

/// Issued token record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Unique token identifier (`jti`)
    pub jti: String,
    /// User the token was issued for
    pub subject: String,
    /// Client the token was issued to (`aud`)
    pub client_id: String,
    /// Granted scopes
    pub scopes: ScopeSet,
    /// Token kind
    pub token_type: TokenType,
    /// When the token was minted
    pub issued_at: DateTime<Utc>,
    /// When the token stops verifying
    pub expires_at: DateTime<Utc>,
    /// Key that signed the token
    pub signing_kid: String,
    /// Session bound to this token, if any
    pub session_id: Option<String>,
    /// Revocation flag; only meaningful for stateful types
    pub revoked: bool,
}

/// What happened to a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEventKind {
    /// Token was minted
    Issued,
    /// Token verified successfully
    Validated,
    /// Token failed verification
    ValidationFailed,
    /// Token was revoked
    Revoked,
}

/// Entry in the issuer's event feed consumed by anomaly detection and statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEvent {
    /// Event identifier, used as anomaly evidence
    pub id: Uuid,
    /// Event kind
    pub kind: TokenEventKind,
    /// Token subject, when it could be determined
    pub subject: Option<String>,
    /// Client the token belongs to, when known
    pub client_id: Option<String>,
    /// Token identifier, when known
    pub jti: Option<String>,
    /// Token type, when known
    pub token_type: Option<TokenType>,
    /// Source IP of the request
    pub ip: Option<String>,
    /// Source user agent of the request
    pub user_agent: Option<String>,
    /// When the event happened
    pub occurred_at: DateTime<Utc>,
}

/// Network origin of a request, threaded into audit and token events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOrigin {
    /// Client IP address as seen by the boundary
    pub ip: Option<String>,
    /// Client user agent
    pub user_agent: Option<String>,
}

impl RequestOrigin {
    /// Origin with a known IP and no user agent
    pub fn from_ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            user_agent: None,
        }
    }

    /// Origin for internally triggered actions
    #[must_use]
    pub const fn system() -> Self {
        Self {
            ip: None,
            user_agent: None,
        }
    }
}
