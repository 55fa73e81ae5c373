// ABOUTME: Route module organization for the identity server HTTP endpoints
// ABOUTME: Merges every route group into one router with request tracing and ids
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Route module for the identity server
//!
//! Each domain module contains only route definitions and thin handlers that
//! delegate to the components held in [`ServerResources`].

/// Admin routes for clients, keys, reports, and audit
pub mod admin;
/// Bearer authentication and request origin helpers
pub mod auth;
/// Self-service consent routes
pub mod consents;
/// Health check routes
pub mod health;
/// OAuth 2.0 authorization, consent, and token routes
pub mod oauth;
/// Self-service session routes
pub mod sessions;
/// JWKS and discovery metadata
pub mod well_known;

pub use admin::AdminRoutes;
pub use auth::{authenticate, AuthenticatedUser, ClientOrigin};
pub use consents::ConsentRoutes;
pub use health::HealthRoutes;
pub use oauth::OAuthRoutes;
pub use sessions::SessionRoutes;
pub use well_known::WellKnownRoutes;

use crate::resources::ServerResources;
use axum::http::HeaderName;
use axum::Router;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Header carrying the per-request id
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the complete application router
pub fn router(resources: &Arc<ServerResources>) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .merge(HealthRoutes::routes(resources.clone()))
        .merge(WellKnownRoutes::routes(resources.clone()))
        .merge(OAuthRoutes::routes(resources.clone()))
        .merge(SessionRoutes::routes(resources.clone()))
        .merge(ConsentRoutes::routes(resources.clone()))
        .merge(AdminRoutes::routes(resources.clone()))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}
