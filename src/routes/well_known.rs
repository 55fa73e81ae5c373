// ABOUTME: Public discovery routes serving the JWKS and OpenID provider metadata
// ABOUTME: JWKS responses carry an ETag so relying parties can revalidate cheaply
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::resources::ServerResources;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use identity_core::errors::AppError;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Relying parties may cache key material this long before revalidating
const JWKS_CACHE_CONTROL: &str = "public, max-age=3600";

/// Discovery and key publication routes
pub struct WellKnownRoutes;

impl WellKnownRoutes {
    /// Create the well-known routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/.well-known/jwks.json", get(Self::handle_jwks))
            .route(
                "/.well-known/openid-configuration",
                get(Self::handle_discovery),
            )
            .with_state(resources)
    }

    /// Publish active and retiring keys
    async fn handle_jwks(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let jwks = resources.keys.jwks();
        let body = serde_json::to_string(&jwks)
            .map_err(|e| AppError::internal(format!("Failed to serialize JWKS: {e}")))?;

        let etag = jwks_etag(&body);
        let etag_value = HeaderValue::from_str(&etag)
            .map_err(|e| AppError::internal(format!("Invalid ETag header: {e}")))?;

        let client_etag = headers
            .get(header::IF_NONE_MATCH)
            .and_then(|h| h.to_str().ok());
        if client_etag == Some(etag.as_str()) {
            tracing::debug!("JWKS ETag match, returning 304 Not Modified");
            return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag_value)]).into_response());
        }

        tracing::debug!(keys = jwks.keys.len(), "JWKS served");
        Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
                (
                    header::CACHE_CONTROL,
                    HeaderValue::from_static(JWKS_CACHE_CONTROL),
                ),
                (header::ETAG, etag_value),
            ],
            body,
        )
            .into_response())
    }

    async fn handle_discovery(State(resources): State<Arc<ServerResources>>) -> Response {
        Json(resources.discovery.as_ref().clone()).into_response()
    }
}

/// Quoted hex of the first 16 bytes of the body's SHA-256
fn jwks_etag(body: &str) -> String {
    let hash = Sha256::digest(body.as_bytes());
    format!(r#""{}""#, hex::encode(&hash[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_is_stable_and_quoted() {
        let a = jwks_etag(r#"{"keys":[]}"#);
        assert_eq!(a, jwks_etag(r#"{"keys":[]}"#));
        assert_ne!(a, jwks_etag(r#"{"keys":[{}]}"#));
        assert!(a.starts_with('"') && a.ends_with('"'));
        assert_eq!(a.len(), 34);
    }
}
