// ABOUTME: Administrative route handlers for clients, signing keys, security reports, and audit
// ABOUTME: Each handler checks one capability of the caller's role before acting
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Admin routes
//!
//! Every mutating call is attributed to the authenticated admin in the
//! audit trail.

use super::auth::{authenticate, AuthenticatedUser, ClientOrigin};
use crate::keys::{rotate_signing_key, KeyInfo};
use crate::oauth2_server::ClientRegistrationRequest;
use crate::resources::ServerResources;
use crate::security::SuspiciousActivityQuery;
use crate::tokens::TokenStatisticsQuery;
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use identity_core::errors::{AppError, AppResult};
use identity_core::models::{AuditEntry, AuditFilter, ClientView, RequestOrigin};
use identity_core::permissions::Capabilities;
use serde::Serialize;
use std::sync::Arc;

/// Admin routes
pub struct AdminRoutes;

/// Registered clients
#[derive(Debug, Serialize)]
pub struct ClientListResponse {
    /// Clients without secret material
    pub clients: Vec<ClientView>,
}

/// Signing key inventory
#[derive(Debug, Serialize)]
pub struct KeyListResponse {
    /// Kid currently used for signing
    pub active_kid: String,
    /// Every key still held
    pub keys: Vec<KeyInfo>,
}

/// Result of a manual key rotation
#[derive(Debug, Serialize)]
pub struct KeyRotatedResponse {
    /// New active kid
    pub active_kid: String,
    /// Kid moved to retiring
    pub previous_kid: String,
}

/// Audit query result
#[derive(Debug, Serialize)]
pub struct AuditListResponse {
    /// Matching entries, newest first
    pub entries: Vec<AuditEntry>,
}

/// Result of a forced session termination
#[derive(Debug, Serialize)]
pub struct ForcedTerminationResponse {
    /// Terminated session
    pub session_id: String,
    /// Refresh tokens revoked with it
    pub refresh_tokens_revoked: usize,
}

impl AdminRoutes {
    /// Create all admin routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/admin/clients",
                post(Self::handle_register_client).get(Self::handle_list_clients),
            )
            .route(
                "/admin/clients/:client_id/rotate-secret",
                post(Self::handle_rotate_secret),
            )
            .route(
                "/admin/clients/:client_id/toggle-active",
                post(Self::handle_toggle_active),
            )
            .route("/admin/keys", get(Self::handle_list_keys))
            .route("/admin/keys/rotate", post(Self::handle_rotate_keys))
            .route(
                "/admin/security/suspicious-activity",
                get(Self::handle_suspicious_activity),
            )
            .route(
                "/admin/security/token-statistics",
                get(Self::handle_token_statistics),
            )
            .route("/admin/audit", get(Self::handle_audit_log))
            .route(
                "/admin/sessions/:session_id",
                delete(Self::handle_force_terminate_session),
            )
            .with_state(resources)
    }

    /// Authenticate and check one capability
    async fn authorize_admin(
        headers: &HeaderMap,
        resources: &Arc<ServerResources>,
        origin: &RequestOrigin,
        required: Capabilities,
    ) -> AppResult<AuthenticatedUser> {
        let auth = authenticate(headers, resources, origin).await?;
        if let Err(e) = auth.require(required) {
            tracing::warn!(
                user_id = %auth.user_id,
                role = %auth.role,
                required = ?required,
                "Admin call refused"
            );
            return Err(e);
        }
        Ok(auth)
    }

    async fn handle_register_client(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
        Json(request): Json<ClientRegistrationRequest>,
    ) -> Result<Response, AppError> {
        let auth =
            Self::authorize_admin(&headers, &resources, &origin, Capabilities::MANAGE_CLIENTS)
                .await?;
        let credentials = resources
            .clients
            .register(request, Some(&auth.user_id), &origin)
            .await?;
        Ok((StatusCode::CREATED, Json(credentials)).into_response())
    }

    async fn handle_list_clients(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        Self::authorize_admin(&headers, &resources, &origin, Capabilities::MANAGE_CLIENTS).await?;
        let clients = resources.clients.list().await?;
        Ok((StatusCode::OK, Json(ClientListResponse { clients })).into_response())
    }

    /// The new secret appears in this response only
    async fn handle_rotate_secret(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
        Path(client_id): Path<String>,
    ) -> Result<Response, AppError> {
        let auth =
            Self::authorize_admin(&headers, &resources, &origin, Capabilities::MANAGE_CLIENTS)
                .await?;
        let credentials = resources
            .clients
            .rotate_secret(&client_id, Some(&auth.user_id), &origin)
            .await?;
        Ok((StatusCode::OK, Json(credentials)).into_response())
    }

    async fn handle_toggle_active(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
        Path(client_id): Path<String>,
    ) -> Result<Response, AppError> {
        let auth =
            Self::authorize_admin(&headers, &resources, &origin, Capabilities::MANAGE_CLIENTS)
                .await?;
        let client = resources
            .clients
            .toggle_active(&client_id, Some(&auth.user_id), &origin)
            .await?;
        Ok((StatusCode::OK, Json(client)).into_response())
    }

    async fn handle_list_keys(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        Self::authorize_admin(&headers, &resources, &origin, Capabilities::MANAGE_KEYS).await?;
        Ok((
            StatusCode::OK,
            Json(KeyListResponse {
                active_kid: resources.keys.active_kid(),
                keys: resources.keys.key_inventory(),
            }),
        )
            .into_response())
    }

    async fn handle_rotate_keys(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let auth =
            Self::authorize_admin(&headers, &resources, &origin, Capabilities::MANAGE_KEYS)
                .await?;
        let previous_kid = resources.keys.active_kid();
        let active_kid =
            rotate_signing_key(&resources.keys, &resources.audit, Some(&auth.user_id), &origin)
                .await?;
        Ok((
            StatusCode::OK,
            Json(KeyRotatedResponse {
                active_kid,
                previous_kid,
            }),
        )
            .into_response())
    }

    async fn handle_suspicious_activity(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
        query: Result<Query<SuspiciousActivityQuery>, QueryRejection>,
    ) -> Result<Response, AppError> {
        Self::authorize_admin(
            &headers,
            &resources,
            &origin,
            Capabilities::VIEW_SECURITY_REPORTS,
        )
        .await?;
        let Query(query) = query.map_err(query_error)?;
        let report = resources.anomaly.detect_suspicious(query).await?;
        Ok((StatusCode::OK, Json(report)).into_response())
    }

    async fn handle_token_statistics(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
        query: Result<Query<TokenStatisticsQuery>, QueryRejection>,
    ) -> Result<Response, AppError> {
        Self::authorize_admin(
            &headers,
            &resources,
            &origin,
            Capabilities::VIEW_SECURITY_REPORTS,
        )
        .await?;
        let Query(query) = query.map_err(query_error)?;
        let statistics = resources.issuer.statistics(&query).await?;
        Ok((StatusCode::OK, Json(statistics)).into_response())
    }

    async fn handle_audit_log(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
        query: Result<Query<AuditFilter>, QueryRejection>,
    ) -> Result<Response, AppError> {
        Self::authorize_admin(&headers, &resources, &origin, Capabilities::VIEW_AUDIT_LOG)
            .await?;
        let Query(filter) = query.map_err(query_error)?;
        let entries = resources.audit.query(&filter).await?;
        Ok((StatusCode::OK, Json(AuditListResponse { entries })).into_response())
    }

    async fn handle_force_terminate_session(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
        Path(session_id): Path<String>,
    ) -> Result<Response, AppError> {
        let auth = Self::authorize_admin(
            &headers,
            &resources,
            &origin,
            Capabilities::MANAGE_ANY_SESSION,
        )
        .await?;
        resources
            .sessions
            .force_terminate(&session_id, &auth.user_id, &origin)
            .await?;
        let refresh_tokens_revoked = resources.issuer.revoke_for_session(&session_id).await?;
        Ok((
            StatusCode::OK,
            Json(ForcedTerminationResponse {
                session_id,
                refresh_tokens_revoked,
            }),
        )
            .into_response())
    }
}

fn query_error(rejection: QueryRejection) -> AppError {
    AppError::invalid_input(format!("Invalid query parameters: {rejection}"))
}
