// ABOUTME: Configuration management module for centralized server settings
// ABOUTME: Environment-driven settings for issuer, keys, rate limits, sessions, and Redis
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Configuration module for the identity server
//!
//! All settings come from environment variables with defaults from
//! `identity_core::constants`. Invalid values fail startup with a
//! `ConfigError`.

/// Environment and server configuration
pub mod environment;

pub use environment::{
    AnomalyConfig, Environment, IssuerConfig, KeyConfig, LogLevel, RateLimitBackend,
    RateLimitConfig, RedisConfig, ServerConfig, SessionSettings,
};
