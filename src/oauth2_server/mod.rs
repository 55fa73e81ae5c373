// ABOUTME: OAuth 2.0 / OIDC authorization server components
// ABOUTME: Client registry, consent store, discovery metadata, and the authorization pipeline
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// Authorization pipeline orchestrator
pub mod authorization;
/// Relying-party client registry
pub mod client_registry;
/// Consent grants and revocation
pub mod consent;
/// OpenID Connect discovery metadata
pub mod discovery;
/// Request and response types
pub mod models;

/// Authorization pipeline
pub use authorization::AuthorizationServer;
/// Client registry
pub use client_registry::ClientRegistry;
/// Consent store
pub use consent::ConsentStore;
/// Discovery metadata
pub use discovery::DiscoveryDocument;

/// Authorization outcome
pub use models::AuthorizationOutcome;
/// Authorization request
pub use models::AuthorizeRequest;
/// Client registration request
pub use models::ClientRegistrationRequest;
/// Token endpoint request
pub use models::TokenRequest;
/// Token endpoint response
pub use models::TokenResponse;
