// ABOUTME: Security observability: the audit trail and token usage anomaly detection
// ABOUTME: Both are read-mostly consumers of events produced by the other components
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// Distinct-IP anomaly detection
pub mod anomaly;
/// Append-only audit log
pub mod audit;

pub use anomaly::{
    AnomalyDetector, SuspiciousActivityQuery, SuspiciousActivityReport, SuspiciousSubject,
};
pub use audit::AuditLog;
