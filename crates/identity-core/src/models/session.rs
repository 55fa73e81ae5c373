// ABOUTME: Per-device user session records
// ABOUTME: Revocation state is authoritative and re-read on every validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated device session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier
    pub session_id: String,
    /// Owning user
    pub user_id: String,
    /// Free-form device description (user agent, platform)
    pub device_info: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last successful validation
    pub last_seen_at: DateTime<Utc>,
    /// Natural expiry
    pub expires_at: DateTime<Utc>,
    /// Terminated by the user or an administrator
    pub revoked: bool,
}

impl Session {
    /// Not revoked and not past expiry
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}
