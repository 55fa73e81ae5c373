// ABOUTME: Bearer token authentication and request origin extraction for route handlers
// ABOUTME: Resolves the caller's user id, role, and session from an access token
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Request authentication helpers
//!
//! Only access tokens authenticate API calls. A token bound to a session is
//! rejected once that session is terminated, even before the token expires.

use crate::resources::ServerResources;
use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use identity_core::errors::{AppError, AppResult};
use identity_core::models::{RequestOrigin, ScopeSet, TokenType};
use identity_core::permissions::{Capabilities, Role};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Proxy header carrying the original client address
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Caller IP and user agent
///
/// The socket peer is the caller unless it is a configured trusted proxy, in
/// which case the proxy's `x-forwarded-for` entry names the caller.
#[derive(Debug, Clone)]
pub struct ClientOrigin(pub RequestOrigin);

#[async_trait]
impl FromRequestParts<Arc<ServerResources>> for ClientOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        resources: &Arc<ServerResources>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(Self(request_origin(
            &parts.headers,
            peer,
            &resources.config.trusted_proxies,
        )))
    }
}

/// Build an origin from the socket peer and headers
///
/// `x-forwarded-for` is ignored unless `peer` is in `trusted_proxies`.
#[must_use]
pub fn request_origin(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trusted_proxies: &[IpAddr],
) -> RequestOrigin {
    let forwarded = peer
        .filter(|peer| trusted_proxies.contains(peer))
        .and_then(|_| forwarded_client(headers, trusted_proxies));

    RequestOrigin {
        ip: forwarded.or(peer).map(|ip| ip.to_string()),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_owned),
    }
}

/// Nearest forwarded hop that is not one of our own proxies
///
/// Hops are walked right to left since only entries appended by trusted
/// proxies can be believed. A malformed hop stops the walk.
fn forwarded_client(headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> Option<IpAddr> {
    let value = headers.get(FORWARDED_FOR)?.to_str().ok()?;
    for hop in value.rsplit(',') {
        let ip: IpAddr = hop.trim().parse().ok()?;
        if !trusted_proxies.contains(&ip) {
            return Some(ip);
        }
    }
    None
}

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Token subject
    pub user_id: String,
    /// Role from the user directory
    pub role: Role,
    /// Session the token is bound to
    pub session_id: Option<String>,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scopes
    pub scopes: ScopeSet,
}

impl AuthenticatedUser {
    /// Fail with `PermissionDenied` unless the caller's role grants `required`
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` naming the role
    pub fn require(&self, required: Capabilities) -> AppResult<()> {
        self.role.require(required)
    }
}

/// Pull the token out of an `Authorization: Bearer` header
///
/// # Errors
///
/// Returns `AuthInvalid` when the header is missing or not a bearer token
pub fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::auth_invalid("Missing authorization header"))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::auth_invalid("Authorization header must use the Bearer scheme"))
}

/// Authenticate a request from its bearer access token
///
/// # Errors
///
/// Returns `AuthInvalid` for a missing, malformed, non-access, or unknown
/// subject token and for a terminated session; verification errors
/// (`TokenExpired`, `SignatureInvalid`, `UnknownSigningKey`) pass through
pub async fn authenticate(
    headers: &HeaderMap,
    resources: &Arc<ServerResources>,
    origin: &RequestOrigin,
) -> AppResult<AuthenticatedUser> {
    let token = bearer_token(headers)?;
    let verified = resources.issuer.verify(token, origin).await?;
    let claims = verified.claims;
    if claims.typ != TokenType::Access {
        return Err(AppError::auth_invalid("Only access tokens authenticate API calls"));
    }
    if let Some(session_id) = claims.sid.as_deref() {
        resources.sessions.validate(session_id).await?;
    }

    let role = resources
        .users
        .role_of(&claims.sub)
        .await?
        .ok_or_else(|| AppError::auth_invalid("Unknown or disabled user"))?;

    Ok(AuthenticatedUser {
        scopes: claims.scopes(),
        user_id: claims.sub,
        role,
        session_id: claims.sid,
        client_id: claims.aud,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_forwarded_header_honoured_from_trusted_proxy() {
        let proxies = [ip("10.0.0.1"), ip("10.0.0.2")];
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_static("192.0.2.99, 203.0.113.7, 10.0.0.2"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8"));

        // Leftmost entry came from the client and is skipped
        let origin = request_origin(&headers, Some(ip("10.0.0.1")), &proxies);
        assert_eq!(origin.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(origin.user_agent.as_deref(), Some("curl/8"));

        let origin = request_origin(&HeaderMap::new(), Some(ip("10.0.0.1")), &proxies);
        assert_eq!(origin.ip.as_deref(), Some("10.0.0.1"));

        headers.insert(FORWARDED_FOR, HeaderValue::from_static("not-an-ip"));
        let origin = request_origin(&headers, Some(ip("10.0.0.1")), &proxies);
        assert_eq!(origin.ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_forwarded_header_ignored_from_untrusted_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("203.0.113.7"));

        let origin = request_origin(&headers, Some(ip("198.51.100.20")), &[ip("10.0.0.1")]);
        assert_eq!(origin.ip.as_deref(), Some("198.51.100.20"));

        let origin = request_origin(&headers, Some(ip("198.51.100.20")), &[]);
        assert_eq!(origin.ip.as_deref(), Some("198.51.100.20"));

        let origin = request_origin(&headers, None, &[ip("10.0.0.1")]);
        assert_eq!(origin.ip, None);
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }
}
