// ABOUTME: Signing key management and JWKS publication for self-contained tokens
// ABOUTME: Loads PEM key pairs or generates RSA keys once, derives RFC 7638 key ids
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! Signing Key Management
//!
//! This module provides:
//! - Lazy, single-flight initialization of the process-wide RSA signing key
//! - PEM loading of a configured public/private key pair with fallback to
//!   a freshly generated 2048-bit pair
//! - Key ids derived from the RFC 7638 JWK thumbprint
//! - JWKS JSON format for public key distribution
//!
//! ## Security Model
//!
//! - Private keys never leave the server
//! - Public keys distributed via `/oauth2/jwks` and `/.well-known/jwks.json`
//! - Generated keys live for the process lifetime only; a restart without
//!   configured keys invalidates previously issued self-contained tokens

use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::OAuth2Settings;
use crate::constants::oauth2::MIN_RSA_KEY_BITS;
use crate::errors::{AppError, AppResult};
use crate::oauth2_server::types::SignatureAlgorithm;

/// JWK (JSON Web Key) representation for the JWKS endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA")
    pub kty: String,
    /// Public key use (always "sig" for signature)
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key ID
    pub kid: String,
    /// Algorithm
    pub alg: String,
    /// RSA modulus (base64url encoded)
    pub n: String,
    /// RSA exponent (base64url encoded)
    pub e: String,
}

/// JWKS (JSON Web Key Set) container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Array of public keys
    pub keys: Vec<JsonWebKey>,
}

/// Required members of an RSA JWK in lexicographic order (RFC 7638 section 3.2)
#[derive(Serialize)]
struct ThumbprintInput<'a> {
    e: &'a str,
    kty: &'a str,
    n: &'a str,
}

/// Where the key material came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Loaded from configured PEM files
    Configured,
    /// Generated at startup
    Generated,
}

/// The active signing key pair with its derived key id
#[derive(Clone)]
pub struct SigningKeySet {
    kid: String,
    algorithm: SignatureAlgorithm,
    public_key: RsaPublicKey,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    source: KeySource,
    created_at: DateTime<Utc>,
}

impl SigningKeySet {
    /// Build a key set from an RSA key pair
    ///
    /// # Errors
    /// Returns error if the private key cannot be turned into a JWT signing key
    pub fn from_key_pair(private_key: &RsaPrivateKey, source: KeySource) -> AppResult<Self> {
        let public_key = RsaPublicKey::from(private_key);
        let (n, e) = encode_components(&public_key);

        let pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AppError::key_material(format!("Failed to export private key: {e}")))?;
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AppError::key_material(format!("Failed to create encoding key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|e| AppError::key_material(format!("Failed to create decoding key: {e}")))?;

        let kid = match jwk_thumbprint(&n, &e) {
            Ok(thumbprint) => thumbprint,
            Err(error) => {
                warn!(error = %error, "JWK thumbprint failed, using a random key id");
                Uuid::new_v4().to_string()
            }
        };

        Ok(Self {
            kid,
            algorithm: SignatureAlgorithm::RS256,
            public_key,
            encoding_key,
            decoding_key,
            source,
            created_at: Utc::now(),
        })
    }

    /// Generate a new RSA key pair
    ///
    /// # Errors
    /// Returns error if key generation fails
    pub fn generate(key_size_bits: usize) -> AppResult<Self> {
        use rand::rngs::OsRng;

        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, key_size_bits).map_err(|e| {
            AppError::key_material(format!("Failed to generate RSA private key: {e}"))
        })?;
        Self::from_key_pair(&private_key, KeySource::Generated)
    }

    /// Key id
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Default signing algorithm
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Public key
    #[must_use]
    pub const fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Where the key material came from
    #[must_use]
    pub const fn source(&self) -> KeySource {
        self.source
    }

    /// When this key set was created in this process
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Public key in JWK format
    #[must_use]
    pub fn to_jwk(&self) -> JsonWebKey {
        let (n, e) = encode_components(&self.public_key);
        JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: "sig".to_owned(),
            kid: self.kid.clone(), // Safe: JWK owns its key id
            alg: self.algorithm.as_str().to_owned(),
            n,
            e,
        }
    }

    /// Public key set; never contains private material
    #[must_use]
    pub fn jwk_set(&self) -> JsonWebKeySet {
        JsonWebKeySet {
            keys: vec![self.to_jwk()],
        }
    }

    /// Sign claims as a compact JWS with the given algorithm
    ///
    /// # Errors
    /// Returns error if the algorithm is not an RSA algorithm or signing fails
    pub fn sign<T: Serialize>(&self, algorithm: SignatureAlgorithm, claims: &T) -> AppResult<String> {
        let mut header = Header::new(jwt_algorithm(algorithm)?);
        header.kid = Some(self.kid.clone()); // Safe: header owns its key id
        jsonwebtoken::encode(&header, claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to sign token: {e}")))
    }

    /// Verify a compact JWS signed by this key and return its claims
    ///
    /// # Errors
    /// Returns error if the signature, algorithm or expiry is invalid
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> AppResult<T> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AppError::auth_invalid(format!("Malformed token: {e}")))?;
        let mut validation = Validation::new(header.alg);
        validation.algorithms = [
            Algorithm::RS256,
            Algorithm::RS384,
            Algorithm::RS512,
            Algorithm::PS256,
            Algorithm::PS384,
            Algorithm::PS512,
        ]
        .to_vec();
        validation.validate_aud = false;
        jsonwebtoken::decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::auth_invalid(format!("Invalid token: {e}")))
    }
}

/// Map a JWS algorithm to the signer; only RSA algorithms are available
fn jwt_algorithm(algorithm: SignatureAlgorithm) -> AppResult<Algorithm> {
    match algorithm {
        SignatureAlgorithm::RS256 => Ok(Algorithm::RS256),
        SignatureAlgorithm::RS384 => Ok(Algorithm::RS384),
        SignatureAlgorithm::RS512 => Ok(Algorithm::RS512),
        SignatureAlgorithm::PS256 => Ok(Algorithm::PS256),
        SignatureAlgorithm::PS384 => Ok(Algorithm::PS384),
        SignatureAlgorithm::PS512 => Ok(Algorithm::PS512),
        other => Err(AppError::key_material(format!(
            "No signing key available for {}",
            other.as_str()
        ))),
    }
}

/// Base64url modulus and exponent
fn encode_components(public_key: &RsaPublicKey) -> (String, String) {
    (
        URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    )
}

/// RFC 7638 SHA-256 thumbprint of an RSA public key
///
/// # Errors
/// Returns error if the canonical JWK cannot be serialized
pub fn jwk_thumbprint(n: &str, e: &str) -> AppResult<String> {
    let canonical = serde_json::to_vec(&ThumbprintInput { e, kty: "RSA", n })?;
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(&canonical)))
}

/// Strip PEM armour and whitespace, then base64-decode the body
///
/// # Errors
/// Returns error if the body is not valid base64
pub fn decode_pem_body(pem: &str) -> AppResult<Vec<u8>> {
    let body: String = pem
        .lines()
        .filter(|line| !line.trim_start().starts_with("-----"))
        .flat_map(str::chars)
        .filter(|c| !c.is_whitespace())
        .collect();
    STANDARD
        .decode(body)
        .map_err(|e| AppError::key_material(format!("Invalid PEM body: {e}")))
}

/// Load an RSA key pair from PEM files (SPKI public key, PKCS#8 private key)
///
/// # Errors
/// Returns error if a file cannot be read or parsed, a key is smaller than
/// 2048 bits, or the public key does not belong to the private key
pub async fn load_key_pair(
    public_key_location: &str,
    private_key_location: &str,
) -> AppResult<RsaPrivateKey> {
    let public_pem = read_location(public_key_location).await?;
    let private_pem = read_location(private_key_location).await?;

    let public_key = RsaPublicKey::from_public_key_der(&decode_pem_body(&public_pem)?)
        .map_err(|e| AppError::key_material(format!("Invalid public key: {e}")))?;
    let private_key = RsaPrivateKey::from_pkcs8_der(&decode_pem_body(&private_pem)?)
        .map_err(|e| AppError::key_material(format!("Invalid private key: {e}")))?;

    let bits = public_key.size() * 8;
    if bits < MIN_RSA_KEY_BITS {
        return Err(AppError::key_material(format!(
            "RSA key of {bits} bits is below the {MIN_RSA_KEY_BITS}-bit minimum"
        )));
    }
    if RsaPublicKey::from(&private_key) != public_key {
        return Err(AppError::key_material(
            "Configured public key does not match the private key",
        ));
    }

    Ok(private_key)
}

async fn read_location(location: &str) -> AppResult<String> {
    let path = location
        .strip_prefix("file:")
        .or_else(|| location.strip_prefix("classpath:"))
        .unwrap_or(location);
    tokio::fs::read_to_string(Path::new(path))
        .await
        .map_err(|e| AppError::key_material(format!("Cannot read key at {location}: {e}")))
}

/// Owns the process-wide signing key set
pub struct SigningKeyManager {
    public_key_location: Option<String>,
    private_key_location: Option<String>,
    key_size_bits: usize,
    key_set: OnceCell<Arc<SigningKeySet>>,
}

impl SigningKeyManager {
    /// Create a manager for optional PEM locations
    #[must_use]
    pub fn new(public_key_location: Option<String>, private_key_location: Option<String>) -> Self {
        Self {
            public_key_location,
            private_key_location,
            key_size_bits: MIN_RSA_KEY_BITS,
            key_set: OnceCell::new(),
        }
    }

    /// Create a manager from OAuth2 settings
    #[must_use]
    pub fn from_settings(settings: &OAuth2Settings) -> Self {
        Self::new(
            settings.jwt_public_key_location.clone(), // Safe: manager owns its locations
            settings.jwt_private_key_location.clone(), // Safe: manager owns its locations
        )
    }

    /// Create a manager around an existing key set
    #[must_use]
    pub fn with_key_set(key_set: Arc<SigningKeySet>) -> Self {
        Self {
            public_key_location: None,
            private_key_location: None,
            key_size_bits: MIN_RSA_KEY_BITS,
            key_set: OnceCell::from(key_set),
        }
    }

    /// The signing key set, initialized on first use
    ///
    /// Concurrent first calls share a single initialization; every caller
    /// observes the same key set for the life of the process.
    ///
    /// # Errors
    /// Returns error only if key generation itself fails
    pub async fn signing_key_set(&self) -> AppResult<Arc<SigningKeySet>> {
        self.key_set
            .get_or_try_init(|| self.initialize())
            .await
            .cloned()
    }

    async fn initialize(&self) -> AppResult<Arc<SigningKeySet>> {
        if let (Some(public), Some(private)) =
            (&self.public_key_location, &self.private_key_location)
        {
            match load_key_pair(public, private).await {
                Ok(private_key) => {
                    match SigningKeySet::from_key_pair(&private_key, KeySource::Configured) {
                        Ok(key_set) => {
                            info!(kid = %key_set.kid(), "Loaded configured signing key");
                            return Ok(Arc::new(key_set));
                        }
                        Err(e) => {
                            warn!(error = %e, "Configured signing key unusable, generating a new key");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load configured signing key, generating a new key");
                }
            }
        } else {
            info!("No signing key configured, generating a new key");
        }

        let key_size_bits = self.key_size_bits;
        let key_set = tokio::task::spawn_blocking(move || SigningKeySet::generate(key_size_bits))
            .await
            .map_err(|e| AppError::key_material(format!("Key generation task failed: {e}")))??;
        info!(kid = %key_set.kid(), bits = key_size_bits, "Generated signing key");
        Ok(Arc::new(key_set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    #[test]
    fn test_pem_body_ignores_armour_and_whitespace() {
        let pem = "-----BEGIN PUBLIC KEY-----\nAQID\n BA==\r\n-----END PUBLIC KEY-----\n";
        assert_eq!(decode_pem_body(pem).unwrap(), vec![1, 2, 3, 4]);
        assert!(decode_pem_body("-----BEGIN X-----\n!!!\n-----END X-----").is_err());
    }

    #[test]
    fn test_thumbprint_matches_rfc7638_example() {
        // RFC 7638 section 3.1
        let n = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";
        assert_eq!(
            jwk_thumbprint(n, "AQAB").unwrap(),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
    }

    #[test]
    fn test_non_rsa_algorithms_are_rejected() {
        assert!(jwt_algorithm(SignatureAlgorithm::ES256).is_err());
        assert!(jwt_algorithm(SignatureAlgorithm::HS256).is_err());
        assert_eq!(jwt_algorithm(SignatureAlgorithm::PS256).unwrap(), Algorithm::PS256);
    }

    #[tokio::test]
    async fn test_sign_and_verify_with_generated_key() {
        let manager = SigningKeyManager::new(None, None);
        let key_set = manager.signing_key_set().await.unwrap();
        assert_eq!(key_set.source(), KeySource::Generated);

        let exp = Utc::now().timestamp() + 60;
        let token = key_set
            .sign(SignatureAlgorithm::RS256, &json!({"sub": "demo", "exp": exp}))
            .unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some(key_set.kid()));

        let claims: Map<String, Value> = key_set.verify(&token).unwrap();
        assert_eq!(claims["sub"], "demo");

        let jwks = serde_json::to_value(key_set.jwk_set()).unwrap();
        let key = &jwks["keys"][0];
        assert_eq!(key["kid"], key_set.kid());
        assert!(key.get("d").is_none());
        assert!(key.get("p").is_none());
    }
}
