// ABOUTME: OpenID Connect discovery metadata built from the issuer URL
// ABOUTME: Validated once at startup so a broken document never gets served
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use identity_core::constants::keys::SIGNING_ALGORITHM;
use identity_core::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use url::Url;

/// Scopes advertised when the deployment does not configure its own
pub const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email", "offline_access"];

/// Authorization results come back in the body of the authenticated call,
/// never through a redirect, which is what the `none` response type declares
pub const RESPONSE_TYPES: &[&str] = &["none"];

/// Grants the token endpoint accepts
pub const GRANT_TYPES: &[&str] = &["refresh_token"];

/// `/.well-known/openid-configuration` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier, equal to the `iss` claim
    pub issuer: String,
    /// Authorization endpoint
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// Signing key set
    pub jwks_uri: String,
    /// Supported `response_type` values
    pub response_types_supported: Vec<String>,
    /// Supported subject identifier types
    pub subject_types_supported: Vec<String>,
    /// ID token signing algorithms
    pub id_token_signing_alg_values_supported: Vec<String>,
    /// Supported grant types
    pub grant_types_supported: Vec<String>,
    /// Advertised scopes
    pub scopes_supported: Vec<String>,
    /// Client authentication methods at the token endpoint
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}

impl DiscoveryDocument {
    /// Build metadata for an issuer
    #[must_use]
    pub fn for_issuer(issuer: &str, scopes: &[&str]) -> Self {
        let base = issuer.trim_end_matches('/');
        Self {
            issuer: base.to_owned(),
            authorization_endpoint: format!("{base}/oauth/authorize"),
            token_endpoint: format!("{base}/oauth/token"),
            jwks_uri: format!("{base}/.well-known/jwks.json"),
            response_types_supported: strings(RESPONSE_TYPES),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: strings(&[SIGNING_ALGORITHM]),
            grant_types_supported: strings(GRANT_TYPES),
            scopes_supported: strings(scopes),
            token_endpoint_auth_methods_supported: strings(&["client_secret_post", "none"]),
        }
    }

    /// Check every required field is present and every endpoint is absolute
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first missing or malformed field
    pub fn validate(&self) -> AppResult<()> {
        for (field, value) in [
            ("issuer", &self.issuer),
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("jwks_uri", &self.jwks_uri),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::config(format!(
                    "Discovery document is missing {field}"
                )));
            }
            Url::parse(value).map_err(|e| {
                AppError::config(format!("Discovery field {field} is not an absolute URL: {e}"))
            })?;
        }

        for (field, values) in [
            ("response_types_supported", &self.response_types_supported),
            ("subject_types_supported", &self.subject_types_supported),
            (
                "id_token_signing_alg_values_supported",
                &self.id_token_signing_alg_values_supported,
            ),
        ] {
            if values.is_empty() {
                return Err(AppError::config(format!(
                    "Discovery document is missing {field}"
                )));
            }
        }
        Ok(())
    }
}
