// ABOUTME: Signing key lifecycle with copy-on-write snapshots for lock-free verification
// ABOUTME: Active to retiring on rotation, retiring to retired once every signed token expired
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::rsa_key::{JsonWebKey, JsonWebKeySet, RsaKeyPair};
use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use identity_core::constants::keys::{
    MAX_RETIRED_HISTORY, ROTATION_INTERVAL_DAYS, RSA_KEY_SIZE_BITS, SIGNING_ALGORITHM,
};
use identity_core::errors::{AppError, AppResult};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Lifecycle state of a signing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Signs new tokens; exactly one key is active
    Active,
    /// Verifies tokens it signed before rotation; still published
    Retiring,
    /// No longer published or accepted
    Retired,
}

/// A key pair plus grace-period bookkeeping
#[derive(Debug)]
pub struct SigningKey {
    pair: RsaKeyPair,
    /// Longest TTL (seconds) of any token this key has signed
    max_ttl_signed: AtomicI64,
}

impl SigningKey {
    fn new(pair: RsaKeyPair) -> Self {
        Self {
            pair,
            max_ttl_signed: AtomicI64::new(0),
        }
    }

    /// Key identifier
    #[must_use]
    pub fn kid(&self) -> &str {
        self.pair.kid()
    }

    /// Underlying key pair
    #[must_use]
    pub const fn pair(&self) -> &RsaKeyPair {
        &self.pair
    }

    /// Longest TTL signed so far, in seconds
    #[must_use]
    pub fn max_ttl_signed_secs(&self) -> i64 {
        self.max_ttl_signed.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
struct PreviousKey {
    key: Arc<SigningKey>,
    status: KeyStatus,
    retiring_since: DateTime<Utc>,
    retired_at: Option<DateTime<Utc>>,
}

/// Immutable view of the key set; replaced wholesale on every change
#[derive(Debug, Clone)]
struct KeySnapshot {
    active: Arc<SigningKey>,
    /// Retiring and retired keys, newest first
    previous: Vec<PreviousKey>,
}

/// Admin-facing description of one key
#[derive(Debug, Clone, Serialize)]
pub struct KeyInfo {
    /// Key identifier
    pub kid: String,
    /// Signing algorithm
    pub algorithm: &'static str,
    /// Current status
    pub status: KeyStatus,
    /// Generation time
    pub created_at: DateTime<Utc>,
    /// When rotation demoted the key
    pub retiring_since: Option<DateTime<Utc>>,
    /// When the key stopped being published
    pub retired_at: Option<DateTime<Utc>>,
    /// Longest TTL signed, in seconds
    pub max_ttl_signed_secs: i64,
}

/// Tunables for key generation and rotation
#[derive(Debug, Clone)]
pub struct KeyManagerConfig {
    /// RSA modulus size
    pub key_size_bits: usize,
    /// Age after which the scheduled task rotates the active key
    pub rotation_interval: Duration,
    /// Minimum grace before a retiring key may retire
    pub retirement_floor: Duration,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            key_size_bits: RSA_KEY_SIZE_BITS,
            rotation_interval: Duration::days(ROTATION_INTERVAL_DAYS),
            retirement_floor: Duration::zero(),
        }
    }
}

/// Owner of all signing key material
///
/// Readers load the current snapshot without locking. Writers (rotation and
/// retirement) serialize on a mutex that is never held across key generation
/// or an `.await`, build a new snapshot, and publish it with one atomic store.
pub struct KeyManager {
    snapshot: ArcSwap<KeySnapshot>,
    writer: Mutex<()>,
    config: KeyManagerConfig,
}

impl KeyManager {
    /// Create a manager with a freshly generated active key
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if key generation fails
    pub fn new(config: KeyManagerConfig) -> AppResult<Self> {
        let pair = RsaKeyPair::generate(new_kid(Utc::now()), config.key_size_bits)?;
        Ok(Self::with_active_key(config, pair))
    }

    /// Create a manager whose active key is a PKCS#8 private key PEM
    ///
    /// The kid is derived from the PEM so it stays stable across restarts.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the PEM cannot be parsed
    pub fn from_pem(config: KeyManagerConfig, pem: &str) -> AppResult<Self> {
        let digest = Sha256::digest(pem.trim().as_bytes());
        let kid = format!("key_{}", hex::encode(&digest[..8]));
        let pair = RsaKeyPair::from_pkcs8_pem(kid, pem, Utc::now())?;
        Ok(Self::with_active_key(config, pair))
    }

    /// Create a manager around an existing key pair
    #[must_use]
    pub fn with_active_key(config: KeyManagerConfig, pair: RsaKeyPair) -> Self {
        info!(kid = pair.kid(), "Signing key loaded as active");
        Self {
            snapshot: ArcSwap::from_pointee(KeySnapshot {
                active: Arc::new(SigningKey::new(pair)),
                previous: Vec::new(),
            }),
            writer: Mutex::new(()),
            config,
        }
    }

    /// Generate a new active key and demote the current one to retiring
    ///
    /// Returns the new key's `kid`.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if key generation fails; the key set is
    /// unchanged in that case
    pub fn rotate(&self) -> AppResult<String> {
        self.rotate_at(Utc::now())
    }

    /// [`rotate`](Self::rotate) with an explicit clock
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if key generation fails
    pub fn rotate_at(&self, now: DateTime<Utc>) -> AppResult<String> {
        let pair = RsaKeyPair::generate_at(new_kid(now), self.config.key_size_bits, now)?;
        let new_kid = pair.kid().to_owned();
        let incoming = Arc::new(SigningKey::new(pair));

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot.load_full();

        let mut previous = Vec::with_capacity(current.previous.len() + 1);
        previous.push(PreviousKey {
            key: Arc::clone(&current.active),
            status: KeyStatus::Retiring,
            retiring_since: now,
            retired_at: None,
        });
        previous.extend(current.previous.iter().cloned());

        self.snapshot.store(Arc::new(KeySnapshot {
            active: incoming,
            previous,
        }));

        info!(
            new_kid = %new_kid,
            retiring_kid = current.active.kid(),
            "Signing key rotated"
        );
        Ok(new_kid)
    }

    /// Public material of every active and retiring key
    #[must_use]
    pub fn publishable_keys(&self) -> Vec<JsonWebKey> {
        let snapshot = self.snapshot.load();
        std::iter::once(snapshot.active.pair().to_jwk())
            .chain(
                snapshot
                    .previous
                    .iter()
                    .filter(|p| p.status == KeyStatus::Retiring)
                    .map(|p| p.key.pair().to_jwk()),
            )
            .collect()
    }

    /// JWKS document, retiring expired keys first
    #[must_use]
    pub fn jwks(&self) -> JsonWebKeySet {
        self.retire_expired(Utc::now());
        JsonWebKeySet {
            keys: self.publishable_keys(),
        }
    }

    /// Move every retiring key whose grace period has passed to retired
    ///
    /// Grace is the longest TTL the key signed, but never less than the
    /// configured retirement floor. Idempotent; returns the kids retired by
    /// this call.
    pub fn retire_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        if !self.snapshot.load().previous.iter().any(|p| {
            p.status == KeyStatus::Retiring && self.grace_elapsed(p, now)
        }) {
            return Vec::new();
        }

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot.load_full();

        let mut retired = Vec::new();
        let mut previous: Vec<PreviousKey> = current
            .previous
            .iter()
            .cloned()
            .map(|mut p| {
                if p.status == KeyStatus::Retiring && self.grace_elapsed(&p, now) {
                    p.status = KeyStatus::Retired;
                    p.retired_at = Some(now);
                    retired.push(p.key.kid().to_owned());
                }
                p
            })
            .collect();

        let mut kept_retired = 0;
        previous.retain(|p| {
            if p.status != KeyStatus::Retired {
                return true;
            }
            kept_retired += 1;
            kept_retired <= MAX_RETIRED_HISTORY
        });

        self.snapshot.store(Arc::new(KeySnapshot {
            active: Arc::clone(&current.active),
            previous,
        }));

        for kid in &retired {
            info!(kid = %kid, "Signing key retired");
        }
        retired
    }

    /// Whether the active key is older than the rotation interval
    #[must_use]
    pub fn should_rotate(&self, now: DateTime<Utc>) -> bool {
        let created = self.snapshot.load().active.pair().created_at();
        now - created >= self.config.rotation_interval
    }

    /// Every key the manager still remembers, active first
    #[must_use]
    pub fn key_inventory(&self) -> Vec<KeyInfo> {
        let snapshot = self.snapshot.load();
        let active = &snapshot.active;
        std::iter::once(KeyInfo {
            kid: active.kid().to_owned(),
            algorithm: SIGNING_ALGORITHM,
            status: KeyStatus::Active,
            created_at: active.pair().created_at(),
            retiring_since: None,
            retired_at: None,
            max_ttl_signed_secs: active.max_ttl_signed_secs(),
        })
        .chain(snapshot.previous.iter().map(|p| KeyInfo {
            kid: p.key.kid().to_owned(),
            algorithm: SIGNING_ALGORITHM,
            status: p.status,
            created_at: p.key.pair().created_at(),
            retiring_since: Some(p.retiring_since),
            retired_at: p.retired_at,
            max_ttl_signed_secs: p.key.max_ttl_signed_secs(),
        }))
        .collect()
    }

    /// `kid` of the active key
    #[must_use]
    pub fn active_kid(&self) -> String {
        self.snapshot.load().active.kid().to_owned()
    }

    /// Active key, with `ttl_secs` recorded against its grace period
    ///
    /// The TTL is recorded before the caller signs, so a concurrent rotation
    /// can never retire the key ahead of a token it is about to sign.
    pub(crate) fn signing_key(&self, ttl_secs: i64) -> Arc<SigningKey> {
        let active = self.snapshot.load().active.clone();
        active.max_ttl_signed.fetch_max(ttl_secs, Ordering::AcqRel);
        active
    }

    /// Active or retiring key for `kid`
    ///
    /// # Errors
    ///
    /// Returns `UnknownSigningKey` when `kid` is unknown or retired
    pub(crate) fn verification_key(&self, kid: &str) -> AppResult<Arc<SigningKey>> {
        let snapshot = self.snapshot.load();
        if snapshot.active.kid() == kid {
            return Ok(Arc::clone(&snapshot.active));
        }
        snapshot
            .previous
            .iter()
            .find(|p| p.status == KeyStatus::Retiring && p.key.kid() == kid)
            .map(|p| Arc::clone(&p.key))
            .ok_or_else(|| {
                warn!(kid = %kid, "Token presented with unpublished signing key");
                AppError::unknown_signing_key(kid)
            })
    }

    fn grace_elapsed(&self, key: &PreviousKey, now: DateTime<Utc>) -> bool {
        let grace = Duration::seconds(key.key.max_ttl_signed_secs()).max(self.config.retirement_floor);
        now >= key.retiring_since + grace
    }
}

/// `key_<yyyymmddHHMMSS>_<random>`
fn new_kid(now: DateTime<Utc>) -> String {
    let suffix: [u8; 4] = rand::random();
    format!("key_{}_{}", now.format("%Y%m%d%H%M%S"), hex::encode(suffix))
}
