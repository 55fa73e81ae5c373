// ABOUTME: Self-service session routes for listing and terminating the caller's sessions
// ABOUTME: Termination revokes the session's refresh tokens in the same call
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::auth::{authenticate, ClientOrigin};
use crate::resources::ServerResources;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use identity_core::errors::AppError;
use identity_core::models::Session;
use identity_core::permissions::Capabilities;
use serde::Serialize;
use std::sync::Arc;

/// Session management routes
pub struct SessionRoutes;

/// Active sessions of the caller
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    /// Newest first
    pub sessions: Vec<Session>,
    /// Session the calling token belongs to
    pub current_session_id: Option<String>,
}

/// Result of a termination
#[derive(Debug, Serialize)]
pub struct SessionTerminatedResponse {
    /// Terminated session
    pub session_id: String,
    /// Refresh tokens revoked with it
    pub refresh_tokens_revoked: usize,
}

impl SessionRoutes {
    /// Create all session routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/sessions", get(Self::handle_list_sessions))
            .route("/sessions/:session_id", delete(Self::handle_terminate_session))
            .with_state(resources)
    }

    async fn handle_list_sessions(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let auth = authenticate(&headers, &resources, &origin).await?;
        auth.require(Capabilities::MANAGE_OWN_SESSIONS)?;

        let sessions = resources.sessions.list_active(&auth.user_id).await?;
        Ok((
            StatusCode::OK,
            Json(SessionListResponse {
                sessions,
                current_session_id: auth.session_id,
            }),
        )
            .into_response())
    }

    /// Log out of one session, which may be the current one
    async fn handle_terminate_session(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
        Path(session_id): Path<String>,
    ) -> Result<Response, AppError> {
        let auth = authenticate(&headers, &resources, &origin).await?;
        auth.require(Capabilities::MANAGE_OWN_SESSIONS)?;

        let refresh_tokens_revoked = resources
            .authorization
            .logout(&session_id, &auth.user_id, &origin)
            .await?;
        Ok((
            StatusCode::OK,
            Json(SessionTerminatedResponse {
                session_id,
                refresh_tokens_revoked,
            }),
        )
            .into_response())
    }
}
