// ABOUTME: Domain models shared by every identity core component
// ABOUTME: Tokens, clients, consent, sessions, and audit entries
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// Security audit entries
pub mod audit;
/// OAuth client records
pub mod client;
/// Consent records and pending consent requests
pub mod consent;
/// Device sessions
pub mod session;
/// Token records, scopes, and token events
pub mod token;

pub use audit::{AuditAction, AuditEntry, AuditFilter, AuditSeverity};
pub use client::{ClientCredentials, ClientType, ClientView, OAuthClient};
pub use consent::{Consent, PendingConsent};
pub use session::Session;
pub use token::{
    RequestOrigin, ScopeSet, TokenEvent, TokenEventKind, TokenRecord, TokenType,
};
