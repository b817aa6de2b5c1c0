// ABOUTME: Integration tests for the signing key manager and JWK set publication
// ABOUTME: Covers one-time initialization under concurrency, PEM loading and fallback to generated keys
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use authz_server::jwks::{jwk_thumbprint, load_key_pair, KeySource, SigningKeyManager};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tempfile::TempDir;

/// Write a PEM key pair and return `(public_path, private_path)`
fn write_key_pair(dir: &TempDir, private_key: &RsaPrivateKey, public_key: &RsaPublicKey) -> (String, String) {
    let public_path = dir.path().join("public.pem");
    let private_path = dir.path().join("private.pem");
    std::fs::write(&public_path, public_key.to_public_key_pem(LineEnding::LF).unwrap()).unwrap();
    std::fs::write(
        &private_path,
        private_key.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes(),
    )
    .unwrap();
    (
        public_path.display().to_string(),
        format!("file:{}", private_path.display()),
    )
}

#[tokio::test]
async fn test_configured_pem_key_pair_is_loaded() {
    common::init_test_logging();
    let dir = TempDir::new().unwrap();
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let public_key = RsaPublicKey::from(&private_key);
    let (public_path, private_path) = write_key_pair(&dir, &private_key, &public_key);

    let loaded = load_key_pair(&public_path, &private_path).await.unwrap();
    assert_eq!(RsaPublicKey::from(&loaded), public_key);

    let manager = SigningKeyManager::new(Some(public_path), Some(private_path));
    let key_set = manager.signing_key_set().await.unwrap();
    assert_eq!(key_set.source(), KeySource::Configured);

    let jwk_set = key_set.jwk_set();
    assert_eq!(jwk_set.keys.len(), 1);
    let jwk = &jwk_set.keys[0];
    assert_eq!(jwk.kty, "RSA");
    assert_eq!(jwk.key_use, "sig");
    assert_eq!(jwk.kid, jwk_thumbprint(&jwk.n, &jwk.e).unwrap());
}

#[tokio::test]
async fn test_mismatched_or_missing_keys_fall_back_to_generation() {
    common::init_test_logging();
    let dir = TempDir::new().unwrap();
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let other_public = RsaPublicKey::from(&RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap());
    let (public_path, private_path) = write_key_pair(&dir, &private_key, &other_public);

    let error = load_key_pair(&public_path, &private_path).await.unwrap_err();
    assert!(error.message.contains("does not match"));
    assert!(load_key_pair("/nonexistent/public.pem", &private_path)
        .await
        .is_err());

    let manager = SigningKeyManager::new(Some("/nonexistent/public.pem".to_owned()), Some(private_path));
    let key_set = manager.signing_key_set().await.unwrap();
    assert_eq!(key_set.source(), KeySource::Generated);
}

#[tokio::test]
async fn test_concurrent_first_use_shares_one_key() {
    common::init_test_logging();
    let manager = Arc::new(SigningKeyManager::new(None, None));

    let handles = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.signing_key_set().await.unwrap() })
        })
        .collect::<Vec<_>>();

    let mut kids = Vec::new();
    for handle in handles {
        kids.push(handle.await.unwrap().kid().to_owned());
    }
    kids.dedup();
    assert_eq!(kids.len(), 1);

    let again = manager.signing_key_set().await.unwrap();
    assert_eq!(again.kid(), kids[0]);
}
