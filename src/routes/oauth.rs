// ABOUTME: OAuth 2.0 route handlers for authorization, consent decisions, and token refresh
// ABOUTME: Thin HTTP adapters over the authorization server pipeline
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! OAuth 2.0 routes
//!
//! The token endpoint takes `application/x-www-form-urlencoded` bodies as
//! OAuth clients expect. Every response that carries tokens is marked
//! `Cache-Control: no-store`.

use super::auth::{authenticate, ClientOrigin};
use crate::oauth2_server::{AuthorizationOutcome, AuthorizeRequest, TokenRequest};
use crate::resources::ServerResources;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use identity_core::errors::AppError;
use identity_core::permissions::Capabilities;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fallback device description when the caller sends no user agent
const UNKNOWN_DEVICE: &str = "unknown device";

/// OAuth 2.0 routes
pub struct OAuthRoutes;

/// Authorization request body; the user comes from the bearer token
#[derive(Debug, Deserialize)]
pub struct AuthorizeBody {
    /// Requesting client
    pub client_id: String,
    /// Must exactly match a registered redirect URI
    pub redirect_uri: String,
    /// Space-delimited scopes
    pub scope: Option<String>,
    /// Opaque client state, echoed back
    pub state: Option<String>,
    /// Device description for the new session
    pub device_info: Option<String>,
}

/// Consent denial acknowledgement
#[derive(Debug, Serialize)]
pub struct ConsentDeniedResponse {
    /// The discarded pending request
    pub pending_id: String,
    /// Always `denied`
    pub status: &'static str,
}

impl OAuthRoutes {
    /// Create all OAuth routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/oauth/authorize", post(Self::handle_authorize))
            .route("/oauth/token", post(Self::handle_token))
            .route(
                "/oauth/consent/:pending_id/approve",
                post(Self::handle_approve_consent),
            )
            .route(
                "/oauth/consent/:pending_id/deny",
                post(Self::handle_deny_consent),
            )
            .with_state(resources)
    }

    /// Handle an authorization request for the authenticated user
    async fn handle_authorize(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
        Json(body): Json<AuthorizeBody>,
    ) -> Result<Response, AppError> {
        let auth = authenticate(&headers, &resources, &origin).await?;
        auth.require(Capabilities::MANAGE_OWN_CONSENTS)?;

        let device_info = body
            .device_info
            .or_else(|| origin.user_agent.clone())
            .unwrap_or_else(|| UNKNOWN_DEVICE.to_owned());
        let request = AuthorizeRequest {
            client_id: body.client_id,
            redirect_uri: body.redirect_uri,
            scope: body.scope,
            state: body.state,
            user_id: auth.user_id,
            device_info,
        };

        let outcome = resources
            .authorization
            .authorize(&request, &origin)
            .await?;
        Ok(match outcome {
            granted @ AuthorizationOutcome::Granted(_) => no_store(Json(granted)),
            pending @ AuthorizationOutcome::ConsentRequired(_) => {
                (StatusCode::ACCEPTED, Json(pending)).into_response()
            }
        })
    }

    /// Handle the refresh token grant
    async fn handle_token(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        Form(request): Form<TokenRequest>,
    ) -> Result<Response, AppError> {
        let response = resources.authorization.refresh(&request, &origin).await?;
        Ok(no_store(Json(response)))
    }

    /// Approve a parked authorization request and mint tokens
    async fn handle_approve_consent(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
        Path(pending_id): Path<String>,
    ) -> Result<Response, AppError> {
        let auth = authenticate(&headers, &resources, &origin).await?;
        auth.require(Capabilities::MANAGE_OWN_CONSENTS)?;

        let response = resources
            .authorization
            .approve_consent(&pending_id, &auth.user_id, &origin)
            .await?;
        Ok(no_store(Json(response)))
    }

    /// Discard a parked authorization request
    async fn handle_deny_consent(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
        Path(pending_id): Path<String>,
    ) -> Result<Response, AppError> {
        let auth = authenticate(&headers, &resources, &origin).await?;
        auth.require(Capabilities::MANAGE_OWN_CONSENTS)?;

        resources
            .authorization
            .deny_consent(&pending_id, &auth.user_id)?;
        Ok((
            StatusCode::OK,
            Json(ConsentDeniedResponse {
                pending_id,
                status: "denied",
            }),
        )
            .into_response())
    }
}

/// Attach `Cache-Control: no-store` to a token-bearing response
fn no_store(body: impl IntoResponse) -> Response {
    (
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
            (header::PRAGMA, HeaderValue::from_static("no-cache")),
        ],
        body,
    )
        .into_response()
}
