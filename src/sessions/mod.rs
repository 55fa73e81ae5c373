// ABOUTME: User session tracking module
// ABOUTME: Many sessions per user, one per device, each independently revocable
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// Session lifecycle
pub mod manager;

pub use manager::{SessionConfig, SessionManager};
