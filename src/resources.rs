// ABOUTME: Centralized resource container built once at startup and shared by Arc
// ABOUTME: Wires stores, keys, issuer, registry, consent, sessions, limiter, detector, and audit
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Server Resources
//!
//! Every component is created exactly once here. Handlers and background
//! tasks receive an `Arc<ServerResources>` and never construct their own.

use crate::config::ServerConfig;
use crate::keys::KeyManager;
use crate::oauth2_server::discovery::DiscoveryDocument;
use crate::oauth2_server::{AuthorizationServer, ClientRegistry, ConsentStore};
use crate::rate_limiting::{RateLimitStore, RateLimiter};
use crate::security::{AnomalyDetector, AuditLog};
use crate::sessions::SessionManager;
use crate::store::{
    AuditRepository, ClientRepository, ConsentRepository, MemoryStore, RetentionRepository,
    SessionRepository, StoreRetention, TokenEventRepository, TokenRepository, UserDirectory,
};
use crate::tokens::TokenIssuer;
use identity_core::errors::AppResult;
use std::sync::Arc;

/// Store handles, one per collaborator seam
#[derive(Clone)]
pub struct Stores {
    /// Stateful token records
    pub tokens: Arc<dyn TokenRepository>,
    /// Registered clients
    pub clients: Arc<dyn ClientRepository>,
    /// Consent records
    pub consents: Arc<dyn ConsentRepository>,
    /// Sessions
    pub sessions: Arc<dyn SessionRepository>,
    /// Audit sink
    pub audit: Arc<dyn AuditRepository>,
    /// Token event feed
    pub events: Arc<dyn TokenEventRepository>,
    /// User roles
    pub users: Arc<dyn UserDirectory>,
    /// Bulk removal of expired and aged records
    pub retention: Arc<dyn RetentionRepository>,
}

impl Stores {
    /// Every seam backed by one in-memory store
    #[must_use]
    pub fn memory(store: &MemoryStore) -> Self {
        let shared = Arc::new(store.clone());
        Self {
            tokens: shared.clone(),
            clients: shared.clone(),
            consents: shared.clone(),
            sessions: shared.clone(),
            audit: shared.clone(),
            events: shared.clone(),
            users: shared.clone(),
            retention: shared,
        }
    }
}

/// Shared server state
pub struct ServerResources {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,
    /// Signing keys
    pub keys: Arc<KeyManager>,
    /// Token minting and verification
    pub issuer: Arc<TokenIssuer>,
    /// Client registry
    pub clients: Arc<ClientRegistry>,
    /// Consent store
    pub consents: Arc<ConsentStore>,
    /// Session manager
    pub sessions: Arc<SessionManager>,
    /// Authentication endpoint limiter
    pub rate_limiter: Arc<RateLimiter>,
    /// Suspicious activity detector
    pub anomaly: Arc<AnomalyDetector>,
    /// Audit trail
    pub audit: AuditLog,
    /// Authorization pipeline
    pub authorization: Arc<AuthorizationServer>,
    /// User roles
    pub users: Arc<dyn UserDirectory>,
    /// Validated discovery metadata
    pub discovery: Arc<DiscoveryDocument>,
    /// Store retention sweep
    pub retention: Arc<StoreRetention>,
}

impl ServerResources {
    /// Wire every component
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the discovery document built from the
    /// issuer URL is incomplete or a configured duration is out of range
    pub fn new(
        config: Arc<ServerConfig>,
        stores: Stores,
        keys: KeyManager,
        rate_limit_store: Arc<dyn RateLimitStore>,
    ) -> AppResult<Self> {
        let scopes: Vec<&str> = config.issuer.scopes.iter().map(String::as_str).collect();
        let discovery = DiscoveryDocument::for_issuer(&config.issuer.url, &scopes);
        discovery.validate()?;

        let retention = Arc::new(StoreRetention::new(
            stores.retention,
            config.retention_policy()?,
        ));
        let keys = Arc::new(keys);
        let audit = AuditLog::new(stores.audit);
        let issuer = Arc::new(TokenIssuer::new(
            keys.clone(),
            stores.tokens,
            stores.events.clone(),
            config.token_issuer_config()?,
        ));
        let clients = Arc::new(ClientRegistry::new(stores.clients, audit.clone()));
        let consents = Arc::new(ConsentStore::new(
            stores.consents,
            issuer.clone(),
            audit.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            stores.sessions,
            audit.clone(),
            config.session_config()?,
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            rate_limit_store,
            config.rate_limit_policy(),
            audit.clone(),
        ));
        let anomaly = Arc::new(AnomalyDetector::with_deadline(
            stores.events,
            std::time::Duration::from_millis(config.anomaly.deadline_ms),
        ));
        let authorization = Arc::new(
            AuthorizationServer::new(
                clients.clone(),
                consents.clone(),
                issuer.clone(),
                sessions.clone(),
                rate_limiter.clone(),
                audit.clone(),
            )
            .with_pending_ttl(config.pending_consent_ttl()?),
        );

        Ok(Self {
            config,
            keys,
            issuer,
            clients,
            consents,
            sessions,
            rate_limiter,
            anomaly,
            audit,
            authorization,
            users: stores.users,
            discovery: Arc::new(discovery),
            retention,
        })
    }
}
