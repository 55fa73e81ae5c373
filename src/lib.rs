// ABOUTME: Main library entry point for the identity server security core
// ABOUTME: Token issuance, key rotation, client credentials, consent, sessions, and abuse controls
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Identity Server
//!
//! Security core of an OAuth 2.0 / OpenID Connect identity provider.
//!
//! ## Features
//!
//! - **Signing keys**: RS256 keys rotated without invalidating live tokens
//! - **Tokens**: access, ID, and refresh tokens with server-side refresh revocation
//! - **Clients**: registration, secret rotation, and activation toggling
//! - **Consent**: per user and client grants that cascade to refresh tokens on revoke
//! - **Sessions**: device sessions that can be listed and terminated
//! - **Abuse controls**: fixed-window rate limiting and multi-IP token reuse detection
//! - **Audit**: an append-only trail of every security-relevant change
//!
//! ## Architecture
//!
//! Every component is built once in [`resources::ServerResources`] and shared
//! by `Arc`. Persistence sits behind the repository traits in [`store`]; the
//! in-memory [`store::MemoryStore`] implements all of them.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use identity_server::config::ServerConfig;
//! use identity_core::errors::AppResult;
//!
//! fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Issuer {} on port {}", config.issuer.url, config.http_port);
//!     Ok(())
//! }
//! ```

/// Environment-based configuration
pub mod config;

/// Signing key lifecycle and scheduled maintenance
pub mod keys;

/// Periodic background tasks with explicit shutdown
pub mod lifecycle;

/// Structured logging setup
pub mod logging;

/// Authorization server: clients, consent, authorization and refresh
pub mod oauth2_server;

/// Fixed-window rate limiting for authentication endpoints
pub mod rate_limiting;

/// Shared server resources
pub mod resources;

/// HTTP routes
pub mod routes;

/// Audit trail and anomaly detection
pub mod security;

/// Device sessions
pub mod sessions;

/// Repository traits and the in-memory store
pub mod store;

/// Token minting, verification, and statistics
pub mod tokens;
