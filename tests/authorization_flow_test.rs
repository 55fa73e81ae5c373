// ABOUTME: Integration tests for the authorize, consent, and refresh token pipeline
// ABOUTME: Refresh tokens rotate on every use and a replayed one is rejected
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::Duration;
use common::{authorize_request, create_test_server, login, origin, register_client};
use identity_core::errors::ErrorCode;
use identity_core::models::{AuditAction, AuditFilter, ClientType, PendingConsent, TokenType};
use identity_core::permissions::Role;
use identity_server::oauth2_server::{AuthorizationOutcome, AuthorizationServer, TokenRequest};

fn refresh_request(client_id: &str, secret: Option<&str>, refresh_token: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "refresh_token".to_owned(),
        client_id: client_id.to_owned(),
        client_secret: secret.map(str::to_owned),
        refresh_token: Some(refresh_token.to_owned()),
    }
}

fn expect_pending(outcome: AuthorizationOutcome) -> PendingConsent {
    match outcome {
        AuthorizationOutcome::ConsentRequired(pending) => *pending,
        AuthorizationOutcome::Granted(_) => panic!("expected a consent prompt"),
    }
}

#[tokio::test]
async fn test_trusted_client_receives_tokens_without_consent() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Public, true).await;
    let tokens = login(&server, &client.client.client_id, "student-1", Role::Student).await;

    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.state.as_deref(), Some("xyz"));
    assert!(tokens.id_token.is_some());
    assert_eq!(
        tokens.expires_in,
        server.resources.config.issuer.access_ttl_secs
    );

    let ip = origin("192.0.2.10");
    let access = server
        .resources
        .issuer
        .verify(&tokens.access_token, &ip)
        .await
        .unwrap();
    assert_eq!(access.claims.typ, TokenType::Access);
    assert_eq!(access.claims.sub, "student-1");
    assert_eq!(access.claims.sid.as_deref(), Some(tokens.session_id.as_str()));
    assert!(server
        .resources
        .consents
        .list_for_user("student-1")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_id_token_only_issued_for_openid_scope() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Public, true).await;
    server.store.upsert_user("student-2", Role::Student);

    let outcome = server
        .resources
        .authorization
        .authorize(
            &authorize_request(&client.client.client_id, "student-2", "profile"),
            &origin("192.0.2.11"),
        )
        .await
        .unwrap();
    let AuthorizationOutcome::Granted(tokens) = outcome else {
        panic!("trusted client must not prompt");
    };
    assert!(tokens.id_token.is_none());
    assert_eq!(tokens.scope, "profile");
}

#[tokio::test]
async fn test_refresh_rotates_and_replay_is_rejected() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Confidential, true).await;
    let client_id = client.client.client_id.clone();
    let secret = client.client_secret.unwrap();
    let tokens = login(&server, &client_id, "teacher-1", Role::Teacher).await;
    let ip = origin("192.0.2.10");

    let rotated = server
        .resources
        .authorization
        .refresh(
            &refresh_request(&client_id, Some(&secret), &tokens.refresh_token),
            &ip,
        )
        .await
        .unwrap();
    assert_ne!(rotated.refresh_token, tokens.refresh_token);
    assert_eq!(rotated.session_id, tokens.session_id);
    assert_eq!(rotated.scope, tokens.scope);

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

    // The rotated token stays usable
    server
        .resources
        .authorization
        .refresh(
            &refresh_request(&client_id, Some(&secret), &rotated.refresh_token),
            &ip,
        )
        .await
        .unwrap();

    let refreshed = server
        .resources
        .audit
        .query(&AuditFilter {
            action: Some(AuditAction::TokenRefreshed),
            ..AuditFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(refreshed.len(), 2);
}

#[tokio::test]
async fn test_refresh_rejects_malformed_requests() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Confidential, true).await;
    let client_id = client.client.client_id.clone();
    let secret = client.client_secret.unwrap();
    let tokens = login(&server, &client_id, "teacher-2", Role::Teacher).await;
    let ip = origin("192.0.2.10");
    let authorization = &server.resources.authorization;

    let mut wrong_grant = refresh_request(&client_id, Some(&secret), &tokens.refresh_token);
    wrong_grant.grant_type = "password".to_owned();
    let err = authorization.refresh(&wrong_grant, &ip).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);

    let mut missing = refresh_request(&client_id, Some(&secret), "");
    missing.refresh_token = None;
    let err = authorization.refresh(&missing, &ip).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);

    let err = authorization
        .refresh(
            &refresh_request(&client_id, Some("not-the-secret"), &tokens.refresh_token),
            &ip,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthInvalid);

    // Access tokens cannot be exchanged
    let err = authorization
        .refresh(
            &refresh_request(&client_id, Some(&secret), &tokens.access_token),
            &ip,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthInvalid);

    // The refused attempts did not consume the refresh token
    authorization
        .refresh(
            &refresh_request(&client_id, Some(&secret), &tokens.refresh_token),
            &ip,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_refresh_bound_to_issuing_client() {
    let server = create_test_server();
    let gradebook = register_client(&server, ClientType::Public, true).await;
    let other = register_client(&server, ClientType::Public, true).await;
    let tokens = login(&server, &gradebook.client.client_id, "student-3", Role::Student).await;

    let err = server
        .resources
        .authorization
        .refresh(
            &refresh_request(&other.client.client_id, None, &tokens.refresh_token),
            &origin("192.0.2.10"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthInvalid);
}

#[tokio::test]
async fn test_untrusted_client_requires_consent_then_skips_it() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Public, false).await;
    let client_id = client.client.client_id;
    server.store.upsert_user("parent-1", Role::Parent);
    let ip = origin("192.0.2.30");
    let authorization = &server.resources.authorization;

    let pending = expect_pending(
        authorization
            .authorize(&authorize_request(&client_id, "parent-1", "openid profile"), &ip)
            .await
            .unwrap(),
    );
    assert_eq!(pending.client_name, "Gradebook");
    assert_eq!(pending.user_id, "parent-1");
    assert_eq!(authorization.pending_count(), 1);

    let tokens = authorization
        .approve_consent(&pending.id, "parent-1", &ip)
        .await
        .unwrap();
    assert_eq!(tokens.state.as_deref(), Some("xyz"));
    assert_eq!(authorization.pending_count(), 0);

    let consents = server
        .resources
        .consents
        .list_for_user("parent-1")
        .await
        .unwrap();
    assert_eq!(consents.len(), 1);
    assert!(consents[0].is_active());

    let outcome = authorization
        .authorize(&authorize_request(&client_id, "parent-1", "profile"), &ip)
        .await
        .unwrap();
    assert!(matches!(outcome, AuthorizationOutcome::Granted(_)));
}

#[tokio::test]
async fn test_consent_approval_widens_existing_grant() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Public, false).await;
    let client_id = client.client.client_id;
    let ip = origin("192.0.2.31");
    let authorization = &server.resources.authorization;

    let first = expect_pending(
        authorization
            .authorize(&authorize_request(&client_id, "parent-2", "profile"), &ip)
            .await
            .unwrap(),
    );
    authorization
        .approve_consent(&first.id, "parent-2", &ip)
        .await
        .unwrap();
    let second = expect_pending(
        authorization
            .authorize(&authorize_request(&client_id, "parent-2", "email"), &ip)
            .await
            .unwrap(),
    );
    authorization
        .approve_consent(&second.id, "parent-2", &ip)
        .await
        .unwrap();

    let consents = server
        .resources
        .consents
        .list_for_user("parent-2")
        .await
        .unwrap();
    assert_eq!(consents.len(), 1);
    let granted: Vec<&str> = consents[0].granted_scopes.iter().collect();
    assert!(granted.contains(&"profile"));
    assert!(granted.contains(&"email"));
}

#[tokio::test]
async fn test_pending_consent_ownership_and_denial() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Public, false).await;
    let client_id = client.client.client_id;
    let ip = origin("192.0.2.32");
    let authorization = &server.resources.authorization;

    let pending = expect_pending(
        authorization
            .authorize(&authorize_request(&client_id, "parent-3", "profile"), &ip)
            .await
            .unwrap(),
    );

    let err = authorization
        .approve_consent(&pending.id, "parent-9", &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PermissionDenied);
    let err = authorization.deny_consent(&pending.id, "parent-9").unwrap_err();
    assert_eq!(err.code, ErrorCode::PermissionDenied);

    authorization.deny_consent(&pending.id, "parent-3").unwrap();
    let err = authorization
        .approve_consent(&pending.id, "parent-3", &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);

    let err = authorization
        .approve_consent("no-such-request", "parent-3", &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
    assert!(server
        .resources
        .consents
        .list_for_user("parent-3")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_expired_pending_consent_cannot_be_approved() {
    let server = create_test_server();
    let resources = &server.resources;
    let client = register_client(&server, ClientType::Public, false).await;
    let client_id = client.client.client_id;
    let ip = origin("192.0.2.33");

    let authorization = AuthorizationServer::new(
        resources.clients.clone(),
        resources.consents.clone(),
        resources.issuer.clone(),
        resources.sessions.clone(),
        resources.rate_limiter.clone(),
        resources.audit.clone(),
    )
    .with_pending_ttl(Duration::zero());

    let pending = expect_pending(
        authorization
            .authorize(&authorize_request(&client_id, "parent-5", "profile"), &ip)
            .await
            .unwrap(),
    );
    assert_eq!(authorization.pending_count(), 0);

    let err = authorization
        .approve_consent(&pending.id, "parent-5", &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn test_authorize_validates_client_and_redirect() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Public, true).await;
    let client_id = client.client.client_id.clone();
    let ip = origin("192.0.2.34");
    let authorization = &server.resources.authorization;

    let mut request = authorize_request(&client_id, "student-4", "profile");
    request.redirect_uri = "https://evil.test/callback".to_owned();
    let err = authorization.authorize(&request, &ip).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);

    let err = authorization
        .authorize(&authorize_request("missing", "student-4", "profile"), &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);

    server
        .resources
        .clients
        .toggle_active(&client_id, Some("admin-1"), &ip)
        .await
        .unwrap();
    let err = authorization
        .authorize(&authorize_request(&client_id, "student-4", "profile"), &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ClientInactive);
}
