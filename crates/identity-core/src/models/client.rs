// ABOUTME: OAuth relying-party client records and their public projection
// ABOUTME: Secret hashes live only on the stored record, never on the view
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Whether a client can hold a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Server-side application holding a secret
    Confidential,
    /// Browser or mobile application without a secret
    Public,
}

/// Stored OAuth client
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// OAuth client identifier
    pub client_id: String,
    /// SHA-256 hex digest of the secret (confidential clients only)
    pub client_secret_hash: Option<String>,
    /// Display name
    pub name: String,
    /// Registered redirect URIs, matched exactly
    pub redirect_uris: BTreeSet<String>,
    /// Confidential or public
    pub client_type: ClientType,
    /// First-party clients skip the consent prompt
    pub trusted: bool,
    /// Inactive clients fail authentication regardless of secret
    pub is_active: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Last secret rotation, if any
    pub secret_rotated_at: Option<DateTime<Utc>>,
}

impl OAuthClient {
    /// Public projection without the secret hash
    #[must_use]
    pub fn view(&self) -> ClientView {
        ClientView {
            client_id: self.client_id.clone(),
            name: self.name.clone(),
            redirect_uris: self.redirect_uris.iter().cloned().collect(),
            client_type: self.client_type,
            trusted: self.trusted,
            is_active: self.is_active,
            created_at: self.created_at,
            secret_rotated_at: self.secret_rotated_at,
        }
    }
}

/// Client fields safe to return to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientView {
    /// OAuth client identifier
    pub client_id: String,
    /// Display name
    pub name: String,
    /// Registered redirect URIs
    pub redirect_uris: Vec<String>,
    /// Confidential or public
    pub client_type: ClientType,
    /// First-party flag
    pub trusted: bool,
    /// Active flag
    pub is_active: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Last secret rotation, if any
    pub secret_rotated_at: Option<DateTime<Utc>>,
}

/// Result of registration or rotation; the only place a plaintext secret appears
#[derive(Debug, Serialize)]
pub struct ClientCredentials {
    /// Public client fields
    pub client: ClientView,
    /// Plaintext secret, returned exactly once (absent for public clients)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}
