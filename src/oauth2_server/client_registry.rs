// ABOUTME: OAuth client registration, secret rotation, activation, and authentication
// ABOUTME: Secrets are returned once in plaintext and stored only as SHA-256 digests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::models::ClientRegistrationRequest;
use crate::security::AuditLog;
use crate::store::ClientRepository;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use identity_core::constants::clients::{CLIENT_ID_PREFIX, SECRET_BYTES};
use identity_core::errors::{AppError, AppResult};
use identity_core::models::{
    AuditAction, AuditEntry, AuditSeverity, ClientCredentials, ClientType, ClientView,
    OAuthClient, RequestOrigin,
};
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Registry of relying-party clients
///
/// Owns the secret hashes. The plaintext secret leaves this type exactly
/// once, in the [`ClientCredentials`] returned by `register` or
/// `rotate_secret`.
pub struct ClientRegistry {
    clients: Arc<dyn ClientRepository>,
    audit: AuditLog,
    rng: SystemRandom,
}

impl ClientRegistry {
    /// Create a registry over a client store
    #[must_use]
    pub fn new(clients: Arc<dyn ClientRepository>, audit: AuditLog) -> Self {
        Self {
            clients,
            audit,
            rng: SystemRandom::new(),
        }
    }

    /// Register a client; confidential clients receive their secret once
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty name or an invalid redirect URI,
    /// and `InternalError` if the RNG or store fails
    pub async fn register(
        &self,
        request: ClientRegistrationRequest,
        actor: Option<&str>,
        origin: &RequestOrigin,
    ) -> AppResult<ClientCredentials> {
        let name = request.client_name.trim();
        if name.is_empty() {
            return Err(AppError::invalid_input("client_name is required"));
        }
        if request.redirect_uris.is_empty() {
            return Err(AppError::invalid_input(
                "At least one redirect_uri is required",
            ));
        }
        for uri in &request.redirect_uris {
            validate_redirect_uri_format(uri)?;
        }

        let secret = match request.client_type {
            ClientType::Confidential => Some(self.generate_secret()?),
            ClientType::Public => None,
        };

        let now = Utc::now();
        let client = OAuthClient {
            client_id: format!("{CLIENT_ID_PREFIX}{}", Uuid::new_v4().simple()),
            client_secret_hash: secret.as_deref().map(|s| hash_secret(s)),
            name: name.to_owned(),
            redirect_uris: request.redirect_uris.into_iter().collect::<BTreeSet<_>>(),
            client_type: request.client_type,
            trusted: request.trusted,
            is_active: true,
            created_at: now,
            secret_rotated_at: None,
        };
        self.clients.insert_client(&client).await?;

        let view = client.view();
        let mut entry = AuditEntry::new(AuditAction::ClientRegistered, "client", &view.client_id)
            .with_change(serde_json::Value::Null, json!(view))
            .with_origin(origin);
        if let Some(actor) = actor {
            entry = entry.with_actor(actor);
        }
        self.audit.append(entry).await;

        tracing::info!(client_id = %view.client_id, client_type = ?view.client_type, "Client registered");
        Ok(ClientCredentials {
            client: view,
            client_secret: secret.map(|s| s.to_string()),
        })
    }

    /// Replace a confidential client's secret in one atomic store write
    ///
    /// Once this returns, the old secret fails every authentication and the
    /// new one succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown client, `InvalidInput` for a
    /// public client, and `ResourceConflict` when a concurrent rotation won
    pub async fn rotate_secret(
        &self,
        client_id: &str,
        actor: Option<&str>,
        origin: &RequestOrigin,
    ) -> AppResult<ClientCredentials> {
        let current = self.get(client_id).await?;
        let Some(expected_hash) = current.client_secret_hash.as_deref() else {
            return Err(AppError::invalid_input(format!(
                "Client {client_id} is public and has no secret"
            )));
        };

        let secret = self.generate_secret()?;
        let rotated_at = Utc::now();
        let updated = self
            .clients
            .swap_secret_hash(client_id, expected_hash, &hash_secret(&secret), rotated_at)
            .await?;

        let mut entry = AuditEntry::new(AuditAction::ClientSecretRotated, "client", client_id)
            .with_change(
                json!({ "secret_rotated_at": current.secret_rotated_at }),
                json!({ "secret_rotated_at": updated.secret_rotated_at }),
            )
            .with_origin(origin)
            .with_severity(AuditSeverity::Warning);
        if let Some(actor) = actor {
            entry = entry.with_actor(actor);
        }
        self.audit.append(entry).await;

        tracing::info!(client_id = %client_id, "Client secret rotated");
        Ok(ClientCredentials {
            client: updated.view(),
            client_secret: Some(secret.to_string()),
        })
    }

    /// Flip `is_active`; inactive clients fail authentication
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown client
    pub async fn toggle_active(
        &self,
        client_id: &str,
        actor: Option<&str>,
        origin: &RequestOrigin,
    ) -> AppResult<ClientView> {
        let updated = self.clients.toggle_active(client_id).await?;

        let mut entry = AuditEntry::new(AuditAction::ClientActiveToggled, "client", client_id)
            .with_change(
                json!({ "is_active": !updated.is_active }),
                json!({ "is_active": updated.is_active }),
            )
            .with_origin(origin);
        if let Some(actor) = actor {
            entry = entry.with_actor(actor);
        }
        self.audit.append(entry).await;

        tracing::info!(client_id = %client_id, is_active = updated.is_active, "Client active flag toggled");
        Ok(updated.view())
    }

    /// Authenticate a client by id and presented secret
    ///
    /// Public clients authenticate by id alone. The stored hash is read once
    /// and compared in constant time.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown client, `ClientInactive` for
    /// a deactivated client, and `AuthInvalid` for a wrong or missing secret
    pub async fn authenticate(
        &self,
        client_id: &str,
        presented_secret: Option<&str>,
        origin: &RequestOrigin,
    ) -> AppResult<OAuthClient> {
        let client = self.get(client_id).await?;
        if !client.is_active {
            return Err(AppError::client_inactive(client_id));
        }

        let valid = match (client.client_secret_hash.as_deref(), presented_secret) {
            (None, None) => true,
            (Some(stored), Some(presented)) => {
                let presented = hash_secret(presented);
                bool::from(stored.as_bytes().ct_eq(presented.as_bytes()))
            }
            _ => false,
        };
        if !valid {
            self.audit
                .append(
                    AuditEntry::new(AuditAction::ClientAuthenticationFailed, "client", client_id)
                        .with_origin(origin)
                        .with_severity(AuditSeverity::Warning),
                )
                .await;
            return Err(AppError::auth_invalid("Invalid client credentials"));
        }
        Ok(client)
    }

    /// Fetch a client
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown client
    pub async fn get(&self, client_id: &str) -> AppResult<OAuthClient> {
        self.clients
            .get_client(client_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Client {client_id}")))
    }

    /// Public views of every client
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the store fails
    pub async fn list(&self) -> AppResult<Vec<ClientView>> {
        let mut views: Vec<ClientView> = self
            .clients
            .list_clients()
            .await?
            .iter()
            .map(OAuthClient::view)
            .collect();
        views.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(views)
    }

    /// Require `uri` to exactly match one of the client's registered URIs
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on mismatch
    pub fn validate_redirect_uri(client: &OAuthClient, uri: &str) -> AppResult<()> {
        if client.redirect_uris.contains(uri) {
            Ok(())
        } else {
            tracing::warn!(client_id = %client.client_id, redirect_uri = %uri, "Unregistered redirect_uri");
            Err(AppError::invalid_input("redirect_uri is not registered for this client"))
        }
    }

    fn generate_secret(&self) -> AppResult<Zeroizing<String>> {
        let mut bytes = Zeroizing::new([0u8; SECRET_BYTES]);
        self.rng.fill(&mut *bytes).map_err(|e| {
            tracing::error!(error = ?e, "System RNG failure - cannot generate client secret");
            AppError::internal("System RNG failure")
        })?;
        Ok(Zeroizing::new(URL_SAFE_NO_PAD.encode(bytes.as_slice())))
    }
}

/// SHA-256 hex digest of a secret
fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Registration-time checks: absolute, no fragment, no wildcard, https or loopback http
fn validate_redirect_uri_format(uri: &str) -> AppResult<()> {
    if uri.trim().is_empty() {
        return Err(AppError::invalid_input("redirect_uri must not be empty"));
    }
    if uri.contains('#') {
        tracing::warn!("Rejected redirect_uri with fragment: {}", uri);
        return Err(AppError::invalid_input("redirect_uri must not contain a fragment"));
    }
    if uri.contains('*') {
        tracing::warn!("Rejected redirect_uri with wildcard: {}", uri);
        return Err(AppError::invalid_input("redirect_uri must not contain wildcards"));
    }

    let parsed = url::Url::parse(uri)
        .map_err(|e| AppError::invalid_input(format!("Malformed redirect_uri {uri}: {e}")))?;
    let is_loopback = matches!(
        parsed.host_str(),
        Some("localhost" | "127.0.0.1" | "[::1]")
    );
    match parsed.scheme() {
        "https" => Ok(()),
        "http" if is_loopback => Ok(()),
        _ => {
            tracing::warn!("Rejected redirect_uri with non-HTTPS scheme for non-loopback host: {}", uri);
            Err(AppError::invalid_input(
                "redirect_uri must use https (http is allowed only for loopback hosts)",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use identity_core::errors::ErrorCode;

    fn registry() -> ClientRegistry {
        let store = Arc::new(MemoryStore::new());
        ClientRegistry::new(store.clone(), AuditLog::new(store))
    }

    fn request(client_type: ClientType, uris: &[&str]) -> ClientRegistrationRequest {
        ClientRegistrationRequest {
            client_name: "Gradebook".to_owned(),
            redirect_uris: uris.iter().map(|u| (*u).to_owned()).collect(),
            client_type,
            trusted: false,
        }
    }

    #[test]
    fn test_redirect_uri_rules() {
        assert!(validate_redirect_uri_format("https://app.example/cb").is_ok());
        assert!(validate_redirect_uri_format("http://localhost:3000/cb").is_ok());
        assert!(validate_redirect_uri_format("http://127.0.0.1/cb").is_ok());
        assert!(validate_redirect_uri_format("http://app.example/cb").is_err());
        assert!(validate_redirect_uri_format("https://app.example/cb#frag").is_err());
        assert!(validate_redirect_uri_format("https://*.example/cb").is_err());
        assert!(validate_redirect_uri_format("/relative").is_err());
    }

    #[tokio::test]
    async fn test_public_client_has_no_secret() {
        let registry = registry();
        let origin = RequestOrigin::system();
        let creds = registry
            .register(request(ClientType::Public, &["https://spa.example/cb"]), None, &origin)
            .await
            .unwrap();
        assert!(creds.client_secret.is_none());

        let client_id = creds.client.client_id;
        assert!(client_id.starts_with(CLIENT_ID_PREFIX));
        registry.authenticate(&client_id, None, &origin).await.unwrap();

        let err = registry
            .rotate_secret(&client_id, None, &origin)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_inactive_client_fails_with_correct_secret() {
        let registry = registry();
        let origin = RequestOrigin::system();
        let creds = registry
            .register(
                request(ClientType::Confidential, &["https://app.example/cb"]),
                None,
                &origin,
            )
            .await
            .unwrap();
        let secret = creds.client_secret.unwrap();
        let client_id = creds.client.client_id;

        let view = registry.toggle_active(&client_id, None, &origin).await.unwrap();
        assert!(!view.is_active);
        let err = registry
            .authenticate(&client_id, Some(&secret), &origin)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ClientInactive);

        registry.toggle_active(&client_id, None, &origin).await.unwrap();
        registry
            .authenticate(&client_id, Some(&secret), &origin)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_and_wrong_secret() {
        let registry = registry();
        let origin = RequestOrigin::system();
        let err = registry
            .authenticate("client_missing", Some("x"), &origin)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceNotFound);

        let creds = registry
            .register(
                request(ClientType::Confidential, &["https://app.example/cb"]),
                None,
                &origin,
            )
            .await
            .unwrap();
        let err = registry
            .authenticate(&creds.client.client_id, Some("wrong"), &origin)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthInvalid);
        let err = registry
            .authenticate(&creds.client.client_id, None, &origin)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthInvalid);
    }

    #[test]
    fn test_view_never_carries_hash() {
        let client = OAuthClient {
            client_id: "client_x".to_owned(),
            client_secret_hash: Some(hash_secret("s3cret")),
            name: "X".to_owned(),
            redirect_uris: BTreeSet::from(["https://x.example/cb".to_owned()]),
            client_type: ClientType::Confidential,
            trusted: false,
            is_active: true,
            created_at: Utc::now(),
            secret_rotated_at: None,
        };
        let rendered = serde_json::to_string(&client.view()).unwrap();
        assert!(!rendered.contains(&hash_secret("s3cret")));
        assert!(ClientRegistry::validate_redirect_uri(&client, "https://x.example/cb").is_ok());
        assert!(ClientRegistry::validate_redirect_uri(&client, "https://x.example/cb/").is_err());
    }
}
