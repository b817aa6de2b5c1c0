// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides in-memory databases, server resources, clients and users
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `authz_server`

use std::collections::BTreeSet;
use std::sync::{Arc, Once, OnceLock};

use anyhow::Result;
use authz_server::{
    config::{DatabaseUrl, OAuth2Settings, ServerConfig},
    database::Database,
    jwks::{SigningKeyManager, SigningKeySet},
    oauth2_server::{
        password_encoder, AuthorizationGrantType, ClientAuthenticationMethod, RegisteredClient,
        RegisteredClientRepository, TokenFormat, UserDetails,
    },
    server::ServerResources,
};
use chrono::Duration;
use serde_json::{json, Map};
use url::Url;

static INIT_LOGGER: Once = Once::new();
static KEY_SET: OnceLock<Arc<SigningKeySet>> = OnceLock::new();

pub const ISSUER: &str = "http://localhost:8080";
pub const CLIENT_SECRET: &str = "secret";
pub const REDIRECT_URI: &str = "http://127.0.0.1:8080/authorized";
pub const USER_PASSWORD: &str = "password";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        let _ = tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .try_init();
    });
}

/// One signing key per test binary; RSA generation is slow
pub fn test_key_set() -> Arc<SigningKeySet> {
    KEY_SET
        .get_or_init(|| Arc::new(SigningKeySet::generate(2048).expect("RSA key generation")))
        .clone()
}

/// Configuration for an in-memory server
pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_port: 0,
        database: DatabaseUrl::Memory,
        cors_allowed_origins: "*".to_owned(),
        oauth2: OAuth2Settings {
            issuer_url: Some(Url::parse(ISSUER).expect("issuer URL")),
            ignore_urls: vec!["/health".to_owned(), "/.well-known/**".to_owned()],
            ..OAuth2Settings::default()
        },
    }
}

/// Standard test database setup
pub async fn create_test_database() -> Result<Database> {
    init_test_logging();
    Ok(Database::new(&DatabaseUrl::Memory).await?)
}

/// Server resources over a fresh in-memory database
pub async fn create_test_resources() -> Result<Arc<ServerResources>> {
    let database = create_test_database().await?;
    let key_manager = Arc::new(SigningKeyManager::with_key_set(test_key_set()));
    Ok(Arc::new(ServerResources::with_key_manager(
        test_config(),
        database,
        key_manager,
    )?))
}

/// A confidential client allowed every grant
pub fn confidential_client(client_id: &str, format: TokenFormat) -> RegisteredClient {
    let mut client = RegisteredClient::new(client_id);
    client.client_secret = Some(format!("{{noop}}{CLIENT_SECRET}"));
    client.client_authentication_methods = BTreeSet::from([
        ClientAuthenticationMethod::ClientSecretBasic,
        ClientAuthenticationMethod::ClientSecretPost,
    ]);
    client.authorization_grant_types = BTreeSet::from([
        AuthorizationGrantType::Password,
        AuthorizationGrantType::RefreshToken,
        AuthorizationGrantType::ClientCredentials,
        AuthorizationGrantType::AuthorizationCode,
        AuthorizationGrantType::DeviceCode,
    ]);
    client.redirect_uris = BTreeSet::from([REDIRECT_URI.to_owned()]);
    client.scopes = ["openid", "profile", "read", "write"]
        .map(str::to_owned)
        .into();
    client.token_settings.access_token_format = format;
    client.token_settings.access_token_time_to_live = Duration::seconds(3600);
    client
}

/// A public client for PKCE and the device flow
pub fn public_client(client_id: &str) -> RegisteredClient {
    let mut client = RegisteredClient::new(client_id);
    client.client_authentication_methods = BTreeSet::from([ClientAuthenticationMethod::None]);
    client.authorization_grant_types = BTreeSet::from([
        AuthorizationGrantType::AuthorizationCode,
        AuthorizationGrantType::DeviceCode,
        AuthorizationGrantType::RefreshToken,
    ]);
    client.redirect_uris = BTreeSet::from([REDIRECT_URI.to_owned()]);
    client.scopes = ["openid", "read"].map(str::to_owned).into();
    client.token_settings.access_token_format = TokenFormat::Reference;
    client
}

/// Persist a client
pub async fn register_client(
    resources: &ServerResources,
    client: RegisteredClient,
) -> Result<RegisteredClient> {
    resources.clients.save(&client).await?;
    Ok(client)
}

/// Persist an enabled user with `USER_PASSWORD`
pub async fn create_test_user(resources: &ServerResources, username: &str) -> Result<UserDetails> {
    let mut attributes = Map::new();
    attributes.insert("email".to_owned(), json!(format!("{username}@example.com")));
    let user = UserDetails {
        username: username.to_owned(),
        password_hash: password_encoder::hash_password(USER_PASSWORD, 4)?,
        enabled: true,
        account_non_locked: true,
        authorities: BTreeSet::from(["ROLE_USER".to_owned()]),
        attributes,
    };
    resources.database.users().save_user(&user).await?;
    Ok(user)
}

/// Number of stored authorizations
pub async fn authorization_count(resources: &ServerResources) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM oauth2_authorization")
        .fetch_one(resources.database.pool())
        .await?;
    Ok(count.0)
}
