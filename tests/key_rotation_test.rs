// ABOUTME: Integration tests for signing key rotation, publication, and retirement
// ABOUTME: Tokens signed before a rotation keep verifying until their key retires
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{Duration, Utc};
use common::{create_test_server, origin};
use identity_core::errors::ErrorCode;
use identity_core::models::{AuditAction, AuditFilter, ScopeSet, TokenType};
use identity_server::keys::{rotate_signing_key, run_key_maintenance, KeyStatus};
use identity_server::tokens::TokenGrant;

fn grant(session_id: Option<&str>) -> TokenGrant {
    TokenGrant {
        subject: "student-42".to_owned(),
        client_id: "gradebook".to_owned(),
        scopes: ScopeSet::parse("openid profile"),
        session_id: session_id.map(str::to_owned),
    }
}

#[tokio::test]
async fn test_token_signed_before_rotation_still_verifies() {
    let server = create_test_server();
    let resources = &server.resources;
    let ip = origin("198.51.100.4");

    let old_kid = resources.keys.active_kid();
    let issued = resources
        .issuer
        .issue(&grant(None), TokenType::Access, &ip)
        .await
        .unwrap();

    let new_kid = rotate_signing_key(&resources.keys, &resources.audit, Some("admin-1"), &ip)
        .await
        .unwrap();
    assert_ne!(old_kid, new_kid);
    assert_eq!(resources.keys.active_kid(), new_kid);

    let verified = resources.issuer.verify(&issued.token, &ip).await.unwrap();
    assert_eq!(verified.kid, old_kid);
    assert_eq!(verified.claims.sub, "student-42");

    let fresh = resources
        .issuer
        .issue(&grant(None), TokenType::Access, &ip)
        .await
        .unwrap();
    let verified = resources.issuer.verify(&fresh.token, &ip).await.unwrap();
    assert_eq!(verified.kid, new_kid);
}

#[tokio::test]
async fn test_jwks_publishes_active_and_retiring_keys() {
    let server = create_test_server();
    let resources = &server.resources;
    let old_kid = resources.keys.active_kid();

    rotate_signing_key(&resources.keys, &resources.audit, None, &origin("10.0.0.1"))
        .await
        .unwrap();
    let new_kid = resources.keys.active_kid();

    let jwks = resources.keys.jwks();
    let kids: Vec<&str> = jwks.keys.iter().map(|k| k.kid.as_str()).collect();
    assert_eq!(kids.len(), 2);
    assert!(kids.contains(&old_kid.as_str()));
    assert!(kids.contains(&new_kid.as_str()));
    assert!(jwks.keys.iter().all(|k| k.alg == "RS256" && k.kty == "RSA"));

    let inventory = resources.keys.key_inventory();
    let old = inventory.iter().find(|k| k.kid == old_kid).unwrap();
    assert_eq!(old.status, KeyStatus::Retiring);
}

#[tokio::test]
async fn test_retired_key_is_unpublished_and_rejected() {
    let server = create_test_server();
    let resources = &server.resources;
    let ip = origin("198.51.100.4");
    let old_kid = resources.keys.active_kid();

    let issued = resources
        .issuer
        .issue(&grant(None), TokenType::Access, &ip)
        .await
        .unwrap();
    rotate_signing_key(&resources.keys, &resources.audit, None, &ip)
        .await
        .unwrap();

    // Grace covers the longest configured TTL, so nothing retires yet
    assert!(resources.keys.retire_expired(Utc::now()).is_empty());

    let past_grace = Utc::now()
        + Duration::seconds(resources.config.issuer.refresh_ttl_secs)
        + Duration::minutes(1);
    let report = run_key_maintenance(&resources.keys, &resources.audit, past_grace)
        .await
        .unwrap();
    assert_eq!(report.retired, vec![old_kid.clone()]);

    assert!(resources.keys.jwks().keys.iter().all(|k| k.kid != old_kid));
    let err = resources
        .issuer
        .verify(&issued.token, &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownSigningKey);

    let retired = resources
        .audit
        .query(&AuditFilter {
            action: Some(AuditAction::SigningKeyRetired),
            ..AuditFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(retired.len(), 1);
    assert_eq!(retired[0].resource_id, old_kid);
}

#[tokio::test]
async fn test_manual_rotation_is_audited_with_actor() {
    let server = create_test_server();
    let resources = &server.resources;

    let kid = rotate_signing_key(
        &resources.keys,
        &resources.audit,
        Some("admin-7"),
        &origin("10.1.1.1"),
    )
    .await
    .unwrap();

    let entries = resources
        .audit
        .query(&AuditFilter {
            action: Some(AuditAction::SigningKeyRotated),
            actor_user_id: Some("admin-7".to_owned()),
            ..AuditFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].resource_id, kid);
}

#[tokio::test]
async fn test_tampered_token_fails_signature_check() {
    let server = create_test_server();
    let resources = &server.resources;
    let ip = origin("198.51.100.4");

    let issued = resources
        .issuer
        .issue(&grant(None), TokenType::Access, &ip)
        .await
        .unwrap();
    let mut parts: Vec<String> = issued.token.split('.').map(str::to_owned).collect();
    parts[2] = parts[2].chars().rev().collect();
    let tampered = parts.join(".");

    let err = resources.issuer.verify(&tampered, &ip).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenSignatureInvalid);

    let err = resources.issuer.verify("not-a-jwt", &ip).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenSignatureInvalid);
}
