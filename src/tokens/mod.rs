// ABOUTME: Token minting, verification, revocation, and statistics
// ABOUTME: Access and ID tokens verify statelessly; refresh tokens are store-backed
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Tokens
//!
//! Access and ID tokens are valid while their signature verifies and `exp`
//! has not passed. Revoking them early is not guaranteed; their lifetimes are
//! kept short instead. Refresh tokens are re-checked against the store on
//! every verification.

/// JWT claim set
pub mod claims;
/// Token issuer
pub mod issuer;
/// Aggregate statistics over the event feed
pub mod statistics;

pub use claims::Claims;
pub use issuer::{IssuedToken, TokenGrant, TokenIssuer, TokenIssuerConfig, VerifiedToken};
pub use statistics::{IssuedCounts, TokenStatistics, TokenStatisticsQuery};
