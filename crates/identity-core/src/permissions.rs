// ABOUTME: Closed role set mapped once to capability bitflags
// ABOUTME: Replaces scattered role-string comparisons with a single capability check
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Role-based capability checks
//!
//! Every endpoint asks one question, "does this role carry capability X?",
//! through [`Role::require`]. The role-to-capability table lives in
//! [`Role::capabilities`] and nowhere else.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{AppError, AppResult};

bitflags! {
    /// Capabilities a role may hold
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Capabilities: u16 {
        /// Register, rotate, and toggle OAuth clients
        const MANAGE_CLIENTS = 1 << 0;
        /// Rotate signing keys
        const MANAGE_KEYS = 1 << 1;
        /// Run suspicious-activity and token statistics queries
        const VIEW_SECURITY_REPORTS = 1 << 2;
        /// Read the audit trail
        const VIEW_AUDIT_LOG = 1 << 3;
        /// Terminate other users' sessions
        const MANAGE_ANY_SESSION = 1 << 4;
        /// Manage own sessions
        const MANAGE_OWN_SESSIONS = 1 << 5;
        /// Manage own consents
        const MANAGE_OWN_CONSENTS = 1 << 6;
        /// Read users within the caller's school
        const VIEW_SCHOOL_USERS = 1 << 7;
        /// Read financial records
        const VIEW_FINANCE = 1 << 8;

        /// Baseline every signed-in user holds
        const SELF_SERVICE = Self::MANAGE_OWN_SESSIONS.bits() | Self::MANAGE_OWN_CONSENTS.bits();
    }
}

/// Closed set of platform roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator
    SuperAdmin,
    /// Administrator of a single school
    SchoolAdmin,
    /// Teaching staff
    Teacher,
    /// Enrolled student
    Student,
    /// Parent or guardian
    Parent,
    /// Finance office staff
    FinanceStaff,
    /// Other school staff
    Staff,
}

impl Role {
    /// Capability set granted to this role
    #[must_use]
    pub const fn capabilities(self) -> Capabilities {
        match self {
            Self::SuperAdmin => Capabilities::all(),
            Self::SchoolAdmin => Capabilities::SELF_SERVICE
                .union(Capabilities::VIEW_SCHOOL_USERS)
                .union(Capabilities::VIEW_AUDIT_LOG)
                .union(Capabilities::VIEW_SECURITY_REPORTS)
                .union(Capabilities::MANAGE_ANY_SESSION),
            Self::FinanceStaff => Capabilities::SELF_SERVICE.union(Capabilities::VIEW_FINANCE),
            Self::Teacher | Self::Staff => {
                Capabilities::SELF_SERVICE.union(Capabilities::VIEW_SCHOOL_USERS)
            }
            Self::Student | Self::Parent => Capabilities::SELF_SERVICE,
        }
    }

    /// Whether this role holds every capability in `required`
    #[must_use]
    pub const fn can(self, required: Capabilities) -> bool {
        self.capabilities().contains(required)
    }

    /// Fail with `PermissionDenied` unless this role holds `required`
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` when any required capability is missing
    pub fn require(self, required: Capabilities) -> AppResult<()> {
        if self.can(required) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "Role {self} lacks required capability {required:?}"
            )))
        }
    }

    /// Snake-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::SchoolAdmin => "school_admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::Parent => "parent",
            Self::FinanceStaff => "finance_staff",
            Self::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Self::SuperAdmin),
            "school_admin" => Ok(Self::SchoolAdmin),
            "teacher" => Ok(Self::Teacher),
            "student" => Ok(Self::Student),
            "parent" => Ok(Self::Parent),
            "finance_staff" => Ok(Self::FinanceStaff),
            "staff" => Ok(Self::Staff),
            other => Err(AppError::invalid_input(format!("Unknown role: {other}"))),
        }
    }
}
