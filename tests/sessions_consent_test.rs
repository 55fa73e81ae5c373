// ABOUTME: Integration tests for session termination and consent revocation cascades
// ABOUTME: Ending either one revokes the refresh tokens that depended on it
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{
    authorize_request, create_test_server, login, origin, register_client, TestServer,
};
use identity_core::errors::ErrorCode;
use identity_core::models::{AuditAction, AuditFilter, ClientType, ScopeSet};
use identity_core::permissions::Role;
use identity_server::oauth2_server::{AuthorizationOutcome, TokenRequest, TokenResponse};

fn refresh_request(client_id: &str, secret: Option<&str>, refresh_token: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "refresh_token".to_owned(),
        client_id: client_id.to_owned(),
        client_secret: secret.map(str::to_owned),
        refresh_token: Some(refresh_token.to_owned()),
    }
}

/// Consent through an untrusted client and return its tokens
async fn consented_login(
    server: &TestServer,
    client_id: &str,
    user_id: &str,
    scope: &str,
) -> TokenResponse {
    server.store.upsert_user(user_id, Role::Parent);
    let outcome = server
        .resources
        .authorization
        .authorize(&authorize_request(client_id, user_id, scope), &origin("192.0.2.20"))
        .await
        .unwrap();
    let AuthorizationOutcome::ConsentRequired(pending) = outcome else {
        panic!("untrusted client must ask for consent first");
    };
    server
        .resources
        .authorization
        .approve_consent(&pending.id, user_id, &origin("192.0.2.20"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_terminated_session_revokes_its_refresh_tokens() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Public, true).await;
    let client_id = client.client.client_id;
    let tokens = login(&server, &client_id, "student-1", Role::Student).await;
    let resources = &server.resources;
    let ip = origin("192.0.2.10");

    let active = resources.sessions.list_active("student-1").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].session_id, tokens.session_id);

    let revoked = resources
        .authorization
        .logout(&tokens.session_id, "student-1", &ip)
        .await
        .unwrap();
    assert_eq!(revoked, 1);
    assert!(resources.sessions.list_active("student-1").await.unwrap().is_empty());

    let err = resources
        .authorization
        .refresh(&refresh_request(&client_id, None, &tokens.refresh_token), &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenRevoked);

    let err = resources
        .sessions
        .validate(&tokens.session_id)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthInvalid);
}

#[tokio::test]
async fn test_session_termination_requires_ownership() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Public, true).await;
    let tokens = login(&server, &client.client.client_id, "student-1", Role::Student).await;
    let ip = origin("192.0.2.10");

    let err = server
        .resources
        .authorization
        .logout(&tokens.session_id, "student-2", &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PermissionDenied);

    let err = server
        .resources
        .authorization
        .logout("no-such-session", "student-1", &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);

    // Still usable after the refused attempts
    server
        .resources
        .sessions
        .validate(&tokens.session_id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_sessions_are_independent_per_device() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Public, true).await;
    let client_id = client.client.client_id;
    let laptop = login(&server, &client_id, "teacher-1", Role::Teacher).await;
    let phone = login(&server, &client_id, "teacher-1", Role::Teacher).await;
    assert_ne!(laptop.session_id, phone.session_id);

    server
        .resources
        .authorization
        .logout(&laptop.session_id, "teacher-1", &origin("192.0.2.10"))
        .await
        .unwrap();

    let active = server
        .resources
        .sessions
        .list_active("teacher-1")
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].session_id, phone.session_id);
    server
        .resources
        .authorization
        .refresh(
            &refresh_request(&client_id, None, &phone.refresh_token),
            &origin("192.0.2.10"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_consent_revocation_cascades_to_refresh_tokens() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Confidential, false).await;
    let client_id = client.client.client_id.clone();
    let secret = client.client_secret.unwrap();
    let ip = origin("192.0.2.20");

    let first = consented_login(&server, &client_id, "parent-1", "openid profile").await;
    // Consent already covers the scopes, so a second device gets tokens directly
    let second = match server
        .resources
        .authorization
        .authorize(
            &authorize_request(&client_id, "parent-1", "profile"),
            &ip,
        )
        .await
        .unwrap()
    {
        AuthorizationOutcome::Granted(tokens) => *tokens,
        AuthorizationOutcome::ConsentRequired(_) => panic!("consent should already cover profile"),
    };

    let consents = server
        .resources
        .consents
        .list_for_user("parent-1")
        .await
        .unwrap();
    assert_eq!(consents.len(), 1);
    let consent_id = consents[0].id.clone();

    let err = server
        .resources
        .consents
        .revoke_by_id(&consent_id, "parent-2", &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PermissionDenied);

    let revoked = server
        .resources
        .consents
        .revoke_by_id(&consent_id, "parent-1", &ip)
        .await
        .unwrap();
    assert!(revoked.revoked_at.is_some());

    for tokens in [&first, &second] {
        let err = server
            .resources
            .authorization
            .refresh(
                &refresh_request(&client_id, Some(&secret), &tokens.refresh_token),
                &ip,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenRevoked);
    }

    let covered = server
        .resources
        .consents
        .check("parent-1", &client_id, &ScopeSet::parse("profile"))
        .await
        .unwrap();
    assert!(!covered);

    let err = server
        .resources
        .consents
        .revoke_by_id(&consent_id, "parent-1", &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);

    let entries = server
        .resources
        .audit
        .query(&AuditFilter {
            action: Some(AuditAction::ConsentRevoked),
            ..AuditFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].new_values["refresh_tokens_revoked"], 2);
}

#[tokio::test]
async fn test_wider_scope_request_asks_for_consent_again() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Public, false).await;
    let client_id = client.client.client_id;

    consented_login(&server, &client_id, "parent-4", "profile").await;
    let outcome = server
        .resources
        .authorization
        .authorize(
            &authorize_request(&client_id, "parent-4", "profile email"),
            &origin("192.0.2.20"),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, AuthorizationOutcome::ConsentRequired(_)));
}
