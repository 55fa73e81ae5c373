// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Builds wired server resources over the in-memory store plus client and login helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
//! Shared test utilities for `identity_server`

use identity_core::models::{ClientCredentials, ClientType, RequestOrigin};
use identity_core::permissions::Role;
use identity_server::{
    config::{IssuerConfig, ServerConfig},
    keys::KeyManager,
    oauth2_server::{
        AuthorizationOutcome, AuthorizeRequest, ClientRegistrationRequest, TokenResponse,
    },
    rate_limiting::LocalRateLimitStore,
    resources::{ServerResources, Stores},
    store::MemoryStore,
};
use std::sync::{Arc, Once};

static INIT_LOGGER: Once = Once::new();

/// Issuer used by every test server
pub const TEST_ISSUER: &str = "https://id.school.test";

/// Redirect URI registered for test clients
pub const TEST_REDIRECT_URI: &str = "https://app.school.test/callback";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Resources plus direct access to the backing store
pub struct TestServer {
    /// Backing store, for seeding users and inspecting records
    pub store: MemoryStore,
    /// Wired components
    pub resources: Arc<ServerResources>,
}

/// Configuration with a test issuer and defaults everywhere else
pub fn test_config() -> ServerConfig {
    ServerConfig {
        issuer: IssuerConfig {
            url: TEST_ISSUER.to_owned(),
            ..ServerConfig::default().issuer
        },
        ..ServerConfig::default()
    }
}

/// Build a server over a fresh in-memory store
pub fn create_test_server() -> TestServer {
    create_test_server_with(test_config())
}

/// Build a server over a fresh in-memory store with a custom configuration
pub fn create_test_server_with(config: ServerConfig) -> TestServer {
    init_test_logging();
    let store = MemoryStore::new();
    let keys = KeyManager::new(config.key_manager_config().unwrap()).unwrap();
    let resources = ServerResources::new(
        Arc::new(config),
        Stores::memory(&store),
        keys,
        Arc::new(LocalRateLimitStore::new()),
    )
    .unwrap();
    TestServer {
        store,
        resources: Arc::new(resources),
    }
}

/// Origin for a request from `ip`
pub fn origin(ip: &str) -> RequestOrigin {
    RequestOrigin::from_ip(ip)
}

/// Register a client through the registry
pub async fn register_client(
    server: &TestServer,
    client_type: ClientType,
    trusted: bool,
) -> ClientCredentials {
    server
        .resources
        .clients
        .register(
            ClientRegistrationRequest {
                client_name: "Gradebook".to_owned(),
                redirect_uris: vec![TEST_REDIRECT_URI.to_owned()],
                client_type,
                trusted,
            },
            Some("admin-1"),
            &origin("10.0.0.1"),
        )
        .await
        .unwrap()
}

/// Authorization request for `user_id` asking for `scope`
pub fn authorize_request(client_id: &str, user_id: &str, scope: &str) -> AuthorizeRequest {
    AuthorizeRequest {
        client_id: client_id.to_owned(),
        redirect_uri: TEST_REDIRECT_URI.to_owned(),
        scope: Some(scope.to_owned()),
        state: Some("xyz".to_owned()),
        user_id: user_id.to_owned(),
        device_info: "Firefox on Linux".to_owned(),
    }
}

/// Seed `user_id` with `role` and obtain tokens through a trusted client
pub async fn login(
    server: &TestServer,
    client_id: &str,
    user_id: &str,
    role: Role,
) -> TokenResponse {
    server.store.upsert_user(user_id, role);
    let outcome = server
        .resources
        .authorization
        .authorize(
            &authorize_request(client_id, user_id, "openid profile offline_access"),
            &origin("192.0.2.10"),
        )
        .await
        .unwrap();
    match outcome {
        AuthorizationOutcome::Granted(tokens) => *tokens,
        AuthorizationOutcome::ConsentRequired(pending) => {
            panic!("expected tokens, consent required for {}", pending.client_id)
        }
    }
}
