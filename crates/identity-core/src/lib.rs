// ABOUTME: Core types and constants for the identity provider security core
// ABOUTME: Foundation crate with error handling, domain models, roles, and constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Identity Core
//!
//! Foundation crate providing shared types for the identity server. It changes
//! rarely, so the main crate recompiles without touching it.
//!
//! ## Modules
//!
//! - **errors**: `AppError`, `ErrorCode`, and the HTTP error body
//! - **constants**: default lifetimes, limits, and bounds
//! - **models**: tokens, clients, consent, sessions, audit entries
//! - **permissions**: closed role set mapped to capability flags

/// Unified error handling system with standard error codes
pub mod errors;

/// Application constants organized by domain
pub mod constants;

/// Core domain models
pub mod models;

/// Role-based capability checks
pub mod permissions;
