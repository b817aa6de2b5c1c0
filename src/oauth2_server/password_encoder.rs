// ABOUTME: Password and client secret hashing and verification
// ABOUTME: Supports bcrypt, Argon2 and {noop} encoded values, detected by prefix
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use subtle::ConstantTimeEq;

use crate::errors::{AppError, AppResult};

/// Prefix marking a plaintext value (seeding and tests only)
const NOOP_PREFIX: &str = "{noop}";

/// Prefix some stores put before bcrypt hashes
const BCRYPT_PREFIX: &str = "{bcrypt}";

/// Prefix some stores put before Argon2 hashes
const ARGON2_PREFIX: &str = "{argon2}";

/// Verify a raw value against an encoded one
///
/// Unknown or malformed encodings never match.
#[must_use]
pub fn matches(raw: &str, encoded: &str) -> bool {
    if let Some(plain) = encoded.strip_prefix(NOOP_PREFIX) {
        return raw.as_bytes().ct_eq(plain.as_bytes()).into();
    }

    let encoded = encoded
        .strip_prefix(BCRYPT_PREFIX)
        .or_else(|| encoded.strip_prefix(ARGON2_PREFIX))
        .unwrap_or(encoded);

    if encoded.starts_with("$argon2") {
        return PasswordHash::new(encoded).is_ok_and(|parsed| {
            Argon2::default()
                .verify_password(raw.as_bytes(), &parsed)
                .is_ok()
        });
    }

    if encoded.starts_with("$2") {
        return bcrypt::verify(raw, encoded).unwrap_or(false);
    }

    false
}

/// Hash a user password with bcrypt
///
/// # Errors
///
/// Returns an error if hashing fails
pub fn hash_password(raw: &str, cost: u32) -> AppResult<String> {
    bcrypt::hash(raw, cost).map_err(|e| AppError::internal(format!("Password hashing failed: {e}")))
}

/// Hash a client secret with Argon2
///
/// # Errors
///
/// Returns an error if hashing fails
pub fn hash_client_secret(secret: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::internal(format!("Failed to hash client secret: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_encoding() {
        assert!(matches("demosecret", "{noop}demosecret"));
        assert!(!matches("other", "{noop}demosecret"));
    }

    #[test]
    fn test_bcrypt_encoding() {
        let hash = hash_password("demopassword", 4).unwrap();
        assert!(matches("demopassword", &hash));
        assert!(matches("demopassword", &format!("{{bcrypt}}{hash}")));
        assert!(!matches("wrong", &hash));
    }

    #[test]
    fn test_argon2_encoding() {
        let hash = hash_client_secret("s3cret").unwrap();
        assert!(matches("s3cret", &hash));
        assert!(!matches("s3cret!", &hash));
    }

    #[test]
    fn test_unknown_encoding_never_matches() {
        assert!(!matches("plain", "plain"));
        assert!(!matches("x", "$2b$garbage"));
    }
}
