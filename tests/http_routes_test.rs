// ABOUTME: HTTP-level tests driving the full router with in-process requests
// ABOUTME: Covers JWKS caching headers, bearer authentication, capability checks, and error bodies
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use common::{
    create_test_server, create_test_server_with, login, register_client, test_config, TestServer,
    TEST_ISSUER,
};
use http_body_util::BodyExt;
use identity_core::models::{AuditAction, AuditFilter, ClientType};
use identity_core::permissions::Role;
use identity_server::routes;
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use tower::ServiceExt;

/// Socket peer every request arrives from
const PEER: [u8; 4] = [192, 0, 2, 1];

fn app(server: &TestServer) -> Router {
    routes::router(&server.resources)
}

fn request(method: Method, uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "198.51.100.77")
        .extension(ConnectInfo(SocketAddr::from((PEER, 40_000))));
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Access token for a user seeded with `role`
async fn access_token(server: &TestServer, user_id: &str, role: Role) -> String {
    let client = register_client(server, ClientType::Public, true).await;
    login(server, &client.client.client_id, user_id, role)
        .await
        .access_token
}

#[tokio::test]
async fn test_jwks_served_with_cache_headers_and_etag() {
    let server = create_test_server();

    let response = app(&server)
        .oneshot(request(Method::GET, "/.well-known/jwks.json", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=3600"
    );
    assert!(response.headers().contains_key("x-request-id"));
    let etag = response.headers()[header::ETAG].to_str().unwrap().to_owned();
    let body = json_body(response).await;
    assert_eq!(body["keys"].as_array().unwrap().len(), 1);
    assert_eq!(body["keys"][0]["kid"], server.resources.keys.active_kid());
    assert!(body["keys"][0].get("d").is_none());

    let revalidate = Request::builder()
        .uri("/.well-known/jwks.json")
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    let response = app(&server).oneshot(revalidate).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.headers()[header::ETAG], etag.as_str());
}

#[tokio::test]
async fn test_discovery_document_matches_issuer() {
    let server = create_test_server();

    let response = app(&server)
        .oneshot(request(
            Method::GET,
            "/.well-known/openid-configuration",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["issuer"], TEST_ISSUER);
    assert_eq!(
        body["jwks_uri"],
        format!("{TEST_ISSUER}/.well-known/jwks.json")
    );
    assert_eq!(body["grant_types_supported"], serde_json::json!(["refresh_token"]));
    assert_eq!(body["response_types_supported"], serde_json::json!(["none"]));
}

/// Log out over HTTP and return the IP recorded on the audit entry
async fn logout_audit_ip(server: &TestServer) -> Option<String> {
    let client = register_client(server, ClientType::Public, true).await;
    let tokens = login(server, &client.client.client_id, "student-9", Role::Student).await;

    let uri = format!("/sessions/{}", tokens.session_id);
    let response = app(server)
        .oneshot(request(Method::DELETE, &uri, Some(&tokens.access_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entries = server
        .resources
        .audit
        .query(&AuditFilter {
            action: Some(AuditAction::SessionTerminated),
            ..AuditFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    entries[0].ip.clone()
}

#[tokio::test]
async fn test_forwarded_for_ignored_from_untrusted_peer() {
    let server = create_test_server();
    assert_eq!(logout_audit_ip(&server).await.as_deref(), Some("192.0.2.1"));
}

#[tokio::test]
async fn test_forwarded_for_believed_from_trusted_proxy() {
    let mut config = test_config();
    config.trusted_proxies = vec![IpAddr::from(PEER)];
    let server = create_test_server_with(config);
    assert_eq!(
        logout_audit_ip(&server).await.as_deref(),
        Some("198.51.100.77")
    );
}

#[tokio::test]
async fn test_health_and_readiness() {
    let server = create_test_server();

    let response = app(&server)
        .oneshot(request(Method::GET, "/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&server)
        .oneshot(request(Method::GET, "/ready", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["active_kid"], server.resources.keys.active_kid());
}

#[tokio::test]
async fn test_missing_bearer_token_is_unauthorized() {
    let server = create_test_server();

    let response = app(&server)
        .oneshot(request(Method::GET, "/sessions", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "AUTH_INVALID");

    let response = app(&server)
        .oneshot(request(Method::GET, "/sessions", Some("garbage")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "TOKEN_SIGNATURE_INVALID");
}

#[tokio::test]
async fn test_student_lists_own_sessions_but_not_admin_routes() {
    let server = create_test_server();
    let token = access_token(&server, "student-1", Role::Student).await;

    let response = app(&server)
        .oneshot(request(Method::GET, "/sessions", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
    assert_eq!(body["current_session_id"], body["sessions"][0]["session_id"]);

    let response = app(&server)
        .oneshot(request(Method::GET, "/admin/keys", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "PERMISSION_DENIED");
}

#[tokio::test]
async fn test_logout_invalidates_access_token_session() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Public, true).await;
    let tokens = login(&server, &client.client.client_id, "teacher-1", Role::Teacher).await;

    let uri = format!("/sessions/{}", tokens.session_id);
    let response = app(&server)
        .oneshot(request(Method::DELETE, &uri, Some(&tokens.access_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["refresh_tokens_revoked"], 1);

    // Access tokens bound to the ended session stop working
    let response = app(&server)
        .oneshot(request(Method::GET, "/sessions", Some(&tokens.access_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_super_admin_rotates_client_secret() {
    let server = create_test_server();
    let token = access_token(&server, "admin-1", Role::SuperAdmin).await;
    let target = register_client(&server, ClientType::Confidential, false).await;

    let uri = format!(
        "/admin/clients/{}/rotate-secret",
        target.client.client_id
    );
    let response = app(&server)
        .oneshot(request(Method::POST, &uri, Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let new_secret = body["client_secret"].as_str().unwrap();
    assert_ne!(Some(new_secret), target.client_secret.as_deref());
}

#[tokio::test]
async fn test_school_admin_reports_but_cannot_rotate_keys() {
    let server = create_test_server();
    let token = access_token(&server, "school-admin-1", Role::SchoolAdmin).await;

    let response = app(&server)
        .oneshot(request(
            Method::GET,
            "/admin/security/suspicious-activity?lookback_hours=12&threshold=3",
            Some(&token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["lookback_hours"], 12);
    assert_eq!(body["threshold"], 3);

    let response = app(&server)
        .oneshot(request(Method::POST, "/admin/keys/rotate", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bad_report_parameters_are_rejected() {
    let server = create_test_server();
    let token = access_token(&server, "admin-2", Role::SuperAdmin).await;

    for uri in [
        "/admin/security/suspicious-activity?lookback_hours=abc",
        "/admin/security/suspicious-activity?lookback_hours=500",
        "/admin/security/suspicious-activity?threshold=0",
    ] {
        let response = app(&server)
            .oneshot(request(Method::GET, uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
    }
}

#[tokio::test]
async fn test_token_endpoint_sets_no_store() {
    let server = create_test_server();
    let client = register_client(&server, ClientType::Public, true).await;
    let client_id = client.client.client_id.clone();
    let tokens = login(&server, &client_id, "student-7", Role::Student).await;

    let form = format!(
        "grant_type=refresh_token&client_id={client_id}&refresh_token={}",
        tokens.refresh_token
    );
    let token_request = Request::builder()
        .method(Method::POST)
        .uri("/oauth/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.clone()))
        .unwrap();
    let response = app(&server).oneshot(token_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(response.headers()[header::PRAGMA], "no-cache");
    let body = json_body(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["refresh_token"].is_string());

    let replay = Request::builder()
        .method(Method::POST)
        .uri("/oauth/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let response = app(&server).oneshot(replay).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "TOKEN_REVOKED");
}

#[tokio::test]
async fn test_authorize_parks_untrusted_request_and_approve_mints() {
    let server = create_test_server();
    let token = access_token(&server, "parent-1", Role::Parent).await;
    let untrusted = register_client(&server, ClientType::Public, false).await;

    let body = serde_json::json!({
        "client_id": untrusted.client.client_id,
        "redirect_uri": common::TEST_REDIRECT_URI,
        "scope": "profile",
        "state": "abc",
    });
    let authorize = Request::builder()
        .method(Method::POST)
        .uri("/oauth/authorize")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::USER_AGENT, "Safari on iPad")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app(&server).oneshot(authorize).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let pending = json_body(response).await;
    assert_eq!(pending["status"], "consent_required");
    assert_eq!(pending["device_info"], "Safari on iPad");
    let pending_id = pending["id"].as_str().unwrap();

    let uri = format!("/oauth/consent/{pending_id}/approve");
    let response = app(&server)
        .oneshot(request(Method::POST, &uri, Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let minted = json_body(response).await;
    assert_eq!(minted["state"], "abc");

    let response = app(&server)
        .oneshot(request(Method::GET, "/consents", Some(&token)))
        .await
        .unwrap();
    let consents = json_body(response).await;
    let consent_id = consents["consents"][0]["id"].as_str().unwrap().to_owned();

    let uri = format!("/consents/{consent_id}");
    let response = app(&server)
        .oneshot(request(Method::DELETE, &uri, Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let revoked = json_body(response).await;
    assert!(revoked["revoked_at"].is_string());

    let response = app(&server)
        .oneshot(request(Method::DELETE, &uri, Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
