// ABOUTME: Signing key management module
// ABOUTME: RSA key pairs, JWKS documents, and the rotating key manager
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Signing Keys
//!
//! Exactly one key signs at a time. Rotation demotes it to retiring, where it
//! keeps verifying (and stays in the JWKS) until the longest-lived token it
//! signed has expired.

/// Scheduled rotation and retirement
pub mod maintenance;
/// Key lifecycle and snapshot publication
pub mod manager;
/// RSA key pair and JWK types
pub mod rsa_key;

pub use maintenance::{
    rotate_signing_key, run_key_maintenance, spawn_key_maintenance, MaintenanceReport,
};
pub use manager::{KeyInfo, KeyManager, KeyManagerConfig, KeyStatus, SigningKey};
pub use rsa_key::{JsonWebKey, JsonWebKeySet, RsaKeyPair};
