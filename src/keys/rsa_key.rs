// ABOUTME: RSA key pair wrapper producing JWKs and jsonwebtoken encoding/decoding keys
// ABOUTME: Private material stays inside this type and is never serialized outward
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use identity_core::constants::keys::SIGNING_ALGORITHM;
use identity_core::errors::{AppError, AppResult};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::{
    pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    traits::PublicKeyParts,
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Public half of a signing key in JWK form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type, always `RSA`
    pub kty: String,
    /// Public key use, always `sig`
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key identifier matching the JWT header `kid`
    pub kid: String,
    /// Signing algorithm, always `RS256`
    pub alg: String,
    /// RSA modulus, base64url without padding
    pub n: String,
    /// RSA public exponent, base64url without padding
    pub e: String,
}

/// The document served at `/.well-known/jwks.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Every active and retiring key
    pub keys: Vec<JsonWebKey>,
}

/// RSA key pair with its derived JWT keys
///
/// Encoding and decoding keys are derived once at construction so that the
/// signing path does no PEM work.
pub struct RsaKeyPair {
    kid: String,
    created_at: DateTime<Utc>,
    public_key: RsaPublicKey,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("kid", &self.kid)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl RsaKeyPair {
    /// Generate a fresh key pair from the OS entropy source
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if key generation or PEM derivation fails
    pub fn generate(kid: impl Into<String>, key_size_bits: usize) -> AppResult<Self> {
        Self::generate_at(kid, key_size_bits, Utc::now())
    }

    /// [`generate`](Self::generate) stamped with an explicit creation time
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the RNG or key generation fails
    pub fn generate_at(
        kid: impl Into<String>,
        key_size_bits: usize,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, key_size_bits)
            .map_err(|e| AppError::internal(format!("Failed to generate RSA private key: {e}")))?;
        Self::from_private_key(kid.into(), private_key, created_at)
    }

    /// Rebuild a key pair from a PKCS#8 PEM private key
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the PEM cannot be parsed
    pub fn from_pkcs8_pem(
        kid: impl Into<String>,
        pem: &str,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| AppError::config(format!("Failed to parse private key PEM: {e}")))?;
        Self::from_private_key(kid.into(), private_key, created_at)
    }

    fn from_private_key(
        kid: String,
        private_key: RsaPrivateKey,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem: Zeroizing<String> = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AppError::internal(format!("Failed to export private key as PEM: {e}")))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AppError::internal(format!("Failed to export public key as PEM: {e}")))?;

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AppError::internal(format!("Failed to create encoding key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| AppError::internal(format!("Failed to create decoding key: {e}")))?;

        Ok(Self {
            kid,
            created_at,
            public_key,
            encoding_key,
            decoding_key,
        })
    }

    /// Key identifier
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// When the key was generated
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Key used to sign tokens
    #[must_use]
    pub const fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Key used to verify tokens
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Public material as a JWK
    #[must_use]
    pub fn to_jwk(&self) -> JsonWebKey {
        let n = URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be());

        JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: "sig".to_owned(),
            kid: self.kid.clone(),
            alg: SIGNING_ALGORITHM.to_owned(),
            n,
            e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwk_fields() {
        let pair = RsaKeyPair::generate("key_test", 2048).unwrap();
        let jwk = pair.to_jwk();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.key_use, "sig");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.kid, "key_test");
        // 65537
        assert_eq!(jwk.e, "AQAB");
        assert!(!jwk.n.contains('='));

        let json = serde_json::to_value(&jwk).unwrap();
        assert_eq!(json["use"], "sig");
    }

    #[test]
    fn test_debug_hides_private_material() {
        let pair = RsaKeyPair::generate("key_dbg", 2048).unwrap();
        let rendered = format!("{pair:?}");
        assert!(rendered.contains("key_dbg"));
        assert!(!rendered.contains("PRIVATE"));
    }
}
