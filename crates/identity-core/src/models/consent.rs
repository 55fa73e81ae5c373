// ABOUTME: User consent records and typed pending-consent requests
// ABOUTME: One active consent per (user, client); revocation is terminal
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::token::ScopeSet;

/// A user's grant of scopes to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    /// Consent identifier used by the revocation endpoint
    pub id: String,
    /// Consenting user
    pub user_id: String,
    /// Client receiving access
    pub client_id: String,
    /// Scopes granted
    pub granted_scopes: ScopeSet,
    /// When the grant was recorded
    pub granted_at: DateTime<Utc>,
    /// Set on revocation; a revoked record never becomes active again
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Consent {
    /// Whether this record still grants access
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// Authorization request parked while the user decides on consent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConsent {
    /// Opaque identifier handed to the consent screen
    pub id: String,
    /// User who must approve
    pub user_id: String,
    /// Requesting client
    pub client_id: String,
    /// Client display name for the consent screen
    pub client_name: String,
    /// Redirect URI already validated against the client registration
    pub redirect_uri: String,
    /// Scopes awaiting approval
    pub requested_scopes: ScopeSet,
    /// Client-provided CSRF state, echoed back untouched
    pub state: Option<String>,
    /// Device description for the session that approval will create
    pub device_info: String,
    /// When the request was parked
    pub created_at: DateTime<Utc>,
    /// After this instant approval is refused
    pub expires_at: DateTime<Utc>,
}

impl PendingConsent {
    /// Whether the request can no longer be approved
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
