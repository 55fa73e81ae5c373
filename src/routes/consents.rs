// ABOUTME: Self-service consent routes for listing and revoking client grants
// ABOUTME: Revocation cascades to every refresh token for the user and client pair
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
use identity_core::models::Consent;
use identity_core::permissions::Capabilities;
use serde::Serialize;
use std::sync::Arc;

/// Consent management routes
pub struct ConsentRoutes;

/// Consent history of the caller
#[derive(Debug, Serialize)]
pub struct ConsentListResponse {
    /// Active and revoked records, newest grant first
    pub consents: Vec<Consent>,
}

impl ConsentRoutes {
    /// Create all consent routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/consents", get(Self::handle_list_consents))
            .route("/consents/:consent_id", delete(Self::handle_revoke_consent))
            .with_state(resources)
    }

    async fn handle_list_consents(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let auth = authenticate(&headers, &resources, &origin).await?;
        auth.require(Capabilities::MANAGE_OWN_CONSENTS)?;

        let consents = resources.consents.list_for_user(&auth.user_id).await?;
        Ok((StatusCode::OK, Json(ConsentListResponse { consents })).into_response())
    }

    async fn handle_revoke_consent(
        State(resources): State<Arc<ServerResources>>,
        ClientOrigin(origin): ClientOrigin,
        headers: HeaderMap,
        Path(consent_id): Path<String>,
    ) -> Result<Response, AppError> {
        let auth = authenticate(&headers, &resources, &origin).await?;
        auth.require(Capabilities::MANAGE_OWN_CONSENTS)?;

        let revoked = resources
            .consents
            .revoke_by_id(&consent_id, &auth.user_id, &origin)
            .await?;
        Ok((StatusCode::OK, Json(revoked)).into_response())
    }
}
