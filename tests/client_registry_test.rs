// ABOUTME: Integration tests for client registration, secret rotation, and activation toggling
// ABOUTME: After rotation the old secret fails and the new one succeeds
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{create_test_server, origin, register_client, TEST_REDIRECT_URI};
use identity_core::errors::ErrorCode;
use identity_core::models::{AuditAction, AuditFilter, ClientType};
use identity_server::oauth2_server::ClientRegistrationRequest;

#[tokio::test]
async fn test_confidential_client_authenticates_with_issued_secret() {
    let server = create_test_server();
    let credentials = register_client(&server, ClientType::Confidential, false).await;
    let secret = credentials.client_secret.clone().unwrap();
    let clients = &server.resources.clients;
    let ip = origin("10.0.0.2");

    let client = clients
        .authenticate(&credentials.client.client_id, Some(&secret), &ip)
        .await
        .unwrap();
    assert_eq!(client.client_id, credentials.client.client_id);

    let err = clients
        .authenticate(&credentials.client.client_id, Some("wrong"), &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthInvalid);

    let err = clients
        .authenticate(&credentials.client.client_id, None, &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthInvalid);
}

#[tokio::test]
async fn test_rotate_secret_invalidates_old_secret() {
    let server = create_test_server();
    let credentials = register_client(&server, ClientType::Confidential, false).await;
    let client_id = credentials.client.client_id.clone();
    let old_secret = credentials.client_secret.unwrap();
    let clients = &server.resources.clients;
    let ip = origin("10.0.0.2");

    let rotated = clients
        .rotate_secret(&client_id, Some("admin-1"), &ip)
        .await
        .unwrap();
    let new_secret = rotated.client_secret.unwrap();
    assert_ne!(old_secret, new_secret);
    assert!(rotated.client.secret_rotated_at.is_some());

    let err = clients
        .authenticate(&client_id, Some(&old_secret), &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthInvalid);
    clients
        .authenticate(&client_id, Some(&new_secret), &ip)
        .await
        .unwrap();

    let entries = server
        .resources
        .audit
        .query(&AuditFilter {
            action: Some(AuditAction::ClientSecretRotated),
            resource_id: Some(client_id.clone()),
            ..AuditFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor_user_id.as_deref(), Some("admin-1"));
    let serialized = serde_json::to_string(&entries[0]).unwrap();
    assert!(!serialized.contains(&new_secret));
}

#[tokio::test]
async fn test_public_client_has_no_secret_to_rotate() {
    let server = create_test_server();
    let credentials = register_client(&server, ClientType::Public, false).await;
    assert!(credentials.client_secret.is_none());

    let err = server
        .resources
        .clients
        .rotate_secret(&credentials.client.client_id, None, &origin("10.0.0.2"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
}

#[tokio::test]
async fn test_toggle_active_blocks_authentication() {
    let server = create_test_server();
    let credentials = register_client(&server, ClientType::Confidential, false).await;
    let client_id = credentials.client.client_id.clone();
    let secret = credentials.client_secret.unwrap();
    let clients = &server.resources.clients;
    let ip = origin("10.0.0.2");

    let view = clients
        .toggle_active(&client_id, Some("admin-1"), &ip)
        .await
        .unwrap();
    assert!(!view.is_active);

    let err = clients
        .authenticate(&client_id, Some(&secret), &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ClientInactive);

    let view = clients
        .toggle_active(&client_id, Some("admin-1"), &ip)
        .await
        .unwrap();
    assert!(view.is_active);
    clients
        .authenticate(&client_id, Some(&secret), &ip)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_client_operations_are_not_found() {
    let server = create_test_server();
    let clients = &server.resources.clients;
    let ip = origin("10.0.0.2");

    let err = clients
        .rotate_secret("missing", None, &ip)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
    let err = clients.toggle_active("missing", None, &ip).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn test_registration_rejects_invalid_input() {
    let server = create_test_server();
    let clients = &server.resources.clients;
    let ip = origin("10.0.0.2");

    let err = clients
        .register(
            ClientRegistrationRequest {
                client_name: "   ".to_owned(),
                redirect_uris: vec![TEST_REDIRECT_URI.to_owned()],
                client_type: ClientType::Confidential,
                trusted: false,
            },
            None,
            &ip,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);

    let err = clients
        .register(
            ClientRegistrationRequest {
                client_name: "Library".to_owned(),
                redirect_uris: vec!["not a url".to_owned()],
                client_type: ClientType::Confidential,
                trusted: false,
            },
            None,
            &ip,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
}
