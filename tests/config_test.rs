// ABOUTME: Tests for environment-driven server configuration
// ABOUTME: Serialized because they mutate process environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::env;

use authz_server::config::{DatabaseUrl, OAuth2Settings, ServerConfig};
use authz_server::constants::env_keys;
use serial_test::serial;

const ALL_KEYS: [&str; 10] = [
    env_keys::HTTP_PORT,
    env_keys::DATABASE_URL,
    env_keys::CORS_ALLOWED_ORIGINS,
    env_keys::OAUTH2_ISSUER_URL,
    env_keys::OAUTH2_IGNORE_URLS,
    env_keys::OAUTH2_USERNAME_PARAMETER_NAME,
    env_keys::OAUTH2_PASSWORD_PARAMETER_NAME,
    env_keys::OAUTH2_JWT_PUBLIC_KEY_LOCATION,
    env_keys::OAUTH2_JWT_PRIVATE_KEY_LOCATION,
    env_keys::OAUTH2_DEVICE_VERIFICATION_URI,
];

fn clear_env() {
    for key in ALL_KEYS {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_defaults_without_environment() {
    clear_env();
    let config = ServerConfig::from_env().unwrap();

    assert_eq!(config.http_port, 8080);
    assert!(!config.database.is_memory());
    assert_eq!(config.cors_allowed_origins, "*");
    assert_eq!(config.oauth2, OAuth2Settings::default());
    assert_eq!(config.oauth2.issuer(), None);
    assert_eq!(config.oauth2.username_parameter_name, "username");
    assert_eq!(config.oauth2.password_parameter_name, "password");
}

#[test]
#[serial]
fn test_environment_overrides() {
    clear_env();
    env::set_var(env_keys::HTTP_PORT, "9090");
    env::set_var(env_keys::DATABASE_URL, "sqlite::memory:");
    env::set_var(env_keys::OAUTH2_ISSUER_URL, "https://auth.example.com/");
    env::set_var(env_keys::OAUTH2_IGNORE_URLS, "/health, /.well-known/**,,");
    env::set_var(env_keys::OAUTH2_USERNAME_PARAMETER_NAME, "login");
    env::set_var(env_keys::OAUTH2_JWT_PUBLIC_KEY_LOCATION, "file:/keys/public.pem");

    let config = ServerConfig::from_env().unwrap();
    clear_env();

    assert_eq!(config.http_port, 9090);
    assert_eq!(config.database, DatabaseUrl::Memory);
    assert_eq!(
        config.oauth2.issuer().as_deref(),
        Some("https://auth.example.com")
    );
    assert_eq!(config.oauth2.ignore_urls, vec!["/health", "/.well-known/**"]);
    assert_eq!(config.oauth2.username_parameter_name, "login");
    assert_eq!(
        config.oauth2.jwt_public_key_location.as_deref(),
        Some("file:/keys/public.pem")
    );
    assert_eq!(config.oauth2.jwt_private_key_location, None);
    assert_eq!(
        config.oauth2.device_verification_uri,
        "https://auth.example.com/oauth2/device_verification"
    );
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    clear_env();
    env::set_var(env_keys::HTTP_PORT, "not-a-port");
    assert!(ServerConfig::from_env().is_err());

    clear_env();
    env::set_var(env_keys::OAUTH2_ISSUER_URL, "not a url");
    assert!(ServerConfig::from_env().is_err());

    clear_env();
    env::set_var(env_keys::DATABASE_URL, "postgres://localhost/authz");
    assert!(ServerConfig::from_env().is_err());
    clear_env();
}
