// ABOUTME: Application-wide constants for token lifetimes, limits, and service names
// ABOUTME: Default values consumed by the environment configuration layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// Service identifiers used in tokens and logs
pub mod service_names {
    /// Binary / tracing service name
    pub const IDENTITY_SERVER: &str = "identity-server";
    /// Default issuer when none is configured
    pub const DEFAULT_ISSUER: &str = "http://localhost:8080";
}

/// Token lifetimes in seconds
pub mod token_ttl {
    /// Access token lifetime (15 minutes)
    pub const ACCESS_SECS: i64 = 15 * 60;
    /// ID token lifetime (1 hour)
    pub const ID_SECS: i64 = 60 * 60;
    /// Refresh token lifetime (30 days)
    pub const REFRESH_SECS: i64 = 30 * 24 * 60 * 60;
}

/// Signing key management
pub mod keys {
    /// RSA modulus size for production keys
    pub const RSA_KEY_SIZE_BITS: usize = 2048;
    /// Rotate the active key after this many days
    pub const ROTATION_INTERVAL_DAYS: i64 = 90;
    /// Retired keys kept in the admin-visible history
    pub const MAX_RETIRED_HISTORY: usize = 3;
    /// JWKS cache lifetime advertised to relying parties
    pub const JWKS_MAX_AGE_SECS: u64 = 3600;
    /// JWS algorithm advertised in JWKS and discovery
    pub const SIGNING_ALGORITHM: &str = "RS256";
}

/// Client credential generation
pub mod clients {
    /// Random bytes in a generated client secret
    pub const SECRET_BYTES: usize = 32;
    /// Prefix applied to generated client identifiers
    pub const CLIENT_ID_PREFIX: &str = "client_";
}

/// Session lifetimes
pub mod sessions {
    /// Session lifetime in hours
    pub const SESSION_TTL_HOURS: i64 = 24 * 14;
    /// Pending consent lifetime in seconds
    pub const PENDING_CONSENT_TTL_SECS: i64 = 10 * 60;
}

/// Authentication endpoint rate limits (requests per window)
pub mod rate_limits {
    /// Login attempts per window
    pub const LOGIN_LIMIT: u32 = 5;
    /// Registrations per window
    pub const REGISTRATION_LIMIT: u32 = 3;
    /// Password reset requests per window
    pub const PASSWORD_RESET_LIMIT: u32 = 3;
    /// Token endpoint calls per window
    pub const TOKEN_LIMIT: u32 = 30;
    /// Authorize endpoint calls per window
    pub const AUTHORIZE_LIMIT: u32 = 60;
    /// Window length in milliseconds
    pub const WINDOW_MS: u64 = 60_000;
    /// Longest accepted window (one day)
    pub const MAX_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;
    /// Sweep interval for expired counters
    pub const SWEEP_INTERVAL_SECS: u64 = 60;
    /// Key prefix for the shared Redis backend
    pub const REDIS_KEY_PREFIX: &str = "identity:ratelimit:";
}

/// Anomaly detection bounds
pub mod anomaly {
    /// Smallest accepted lookback window
    pub const MIN_LOOKBACK_HOURS: u32 = 1;
    /// Largest accepted lookback window
    pub const MAX_LOOKBACK_HOURS: u32 = 72;
    /// Default lookback window
    pub const DEFAULT_LOOKBACK_HOURS: u32 = 24;
    /// Smallest accepted distinct-IP threshold
    pub const MIN_THRESHOLD: u32 = 1;
    /// Largest accepted distinct-IP threshold
    pub const MAX_THRESHOLD: u32 = 100;
    /// Default distinct-IP threshold
    pub const DEFAULT_THRESHOLD: u32 = 5;
    /// Scan deadline in milliseconds
    pub const DEADLINE_MS: u64 = 5_000;
}

/// Token statistics query defaults
pub mod statistics {
    /// Default lookback when no start date is given
    pub const DEFAULT_RANGE_DAYS: i64 = 7;
}

/// How long the in-memory store keeps records nothing reads anymore
pub mod retention {
    /// Token events kept for statistics; never shorter than the anomaly lookback
    pub const EVENT_RETENTION_DAYS: i64 = 30;
    /// Audit entries kept for the admin query
    pub const AUDIT_RETENTION_DAYS: i64 = 365;
    /// Seconds between retention sweeps
    pub const SWEEP_INTERVAL_SECS: u64 = 3_600;
}
