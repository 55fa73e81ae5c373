// ABOUTME: Scheduled signing key rotation and retirement with audit entries
// ABOUTME: Key generation runs on the blocking pool so request handling never stalls
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::KeyManager;
use crate::lifecycle::{spawn_periodic, BackgroundTask};
use crate::security::AuditLog;
use chrono::{DateTime, Utc};
use identity_core::errors::{AppError, AppResult};
use identity_core::models::{AuditAction, AuditEntry, RequestOrigin};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// What one maintenance pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// New active kid, when the interval forced a rotation
    pub rotated_to: Option<String>,
    /// Kids retired by this pass
    pub retired: Vec<String>,
}

/// Rotate now, on behalf of `actor`
///
/// # Errors
///
/// Returns `InternalError` if key generation fails or the blocking task panics
pub async fn rotate_signing_key(
    keys: &Arc<KeyManager>,
    audit: &AuditLog,
    actor: Option<&str>,
    origin: &RequestOrigin,
) -> AppResult<String> {
    rotate_at(keys, audit, actor, origin, Utc::now()).await
}

async fn rotate_at(
    keys: &Arc<KeyManager>,
    audit: &AuditLog,
    actor: Option<&str>,
    origin: &RequestOrigin,
    now: DateTime<Utc>,
) -> AppResult<String> {
    let previous_kid = keys.active_kid();
    let manager = Arc::clone(keys);
    let new_kid = tokio::task::spawn_blocking(move || manager.rotate_at(now))
        .await
        .map_err(|e| AppError::internal(format!("Key generation task failed: {e}")))??;

    let mut entry = AuditEntry::new(AuditAction::SigningKeyRotated, "signing_key", &new_kid)
        .with_change(
            json!({ "active_kid": previous_kid }),
            json!({ "active_kid": new_kid }),
        )
        .with_origin(origin);
    if let Some(actor) = actor {
        entry = entry.with_actor(actor);
    }
    audit.append(entry).await;
    Ok(new_kid)
}

/// Retire keys past their grace period, then rotate if the active key is due
///
/// # Errors
///
/// Returns `InternalError` if a due rotation fails; retirements made before
/// the failure still stand
pub async fn run_key_maintenance(
    keys: &Arc<KeyManager>,
    audit: &AuditLog,
    now: DateTime<Utc>,
) -> AppResult<MaintenanceReport> {
    let retired = keys.retire_expired(now);
    for kid in &retired {
        audit
            .append(
                AuditEntry::new(AuditAction::SigningKeyRetired, "signing_key", kid)
                    .with_change(json!({ "status": "retiring" }), json!({ "status": "retired" })),
            )
            .await;
    }

    let rotated_to = if keys.should_rotate(now) {
        Some(rotate_at(keys, audit, None, &RequestOrigin::system(), now).await?)
    } else {
        None
    };

    Ok(MaintenanceReport {
        rotated_to,
        retired,
    })
}

/// Run [`run_key_maintenance`] every `interval` until shut down
#[must_use]
pub fn spawn_key_maintenance(
    keys: Arc<KeyManager>,
    audit: AuditLog,
    interval: Duration,
) -> BackgroundTask {
    spawn_periodic("key_maintenance", interval, move || {
        let keys = keys.clone();
        let audit = audit.clone();
        async move {
            match run_key_maintenance(&keys, &audit, Utc::now()).await {
                Ok(report) if report.rotated_to.is_some() || !report.retired.is_empty() => {
                    tracing::info!(
                        rotated_to = ?report.rotated_to,
                        retired = ?report.retired,
                        "Signing key maintenance applied"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Signing key maintenance failed"),
            }
        }
    })
}
