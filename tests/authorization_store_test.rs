// ABOUTME: Integration tests for the SQLite authorization and registered client stores
// ABOUTME: Covers every lookup key, lookup precedence, idempotent removal and open vocabularies
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::collections::BTreeSet;

use authz_server::errors::ErrorCode;
use authz_server::oauth2_server::{
    AuthenticatedPrincipal, Authorization, AuthorizationGrantType, AuthorizationService,
    ClientAuthenticationMethod, OAuth2Token, OAuth2TokenType, RegisteredClient,
    RegisteredClientRepository, TokenFormat, TokenSlot,
};
use chrono::{Duration, Utc};
use common::{confidential_client, create_test_database};
use serde_json::Value;

fn token(value: &str) -> OAuth2Token {
    let now = Utc::now();
    OAuth2Token::new(value, now, Some(now + Duration::minutes(5)))
}

fn full_authorization(client: &RegisteredClient) -> Authorization {
    let principal = AuthenticatedPrincipal::user("alice", BTreeSet::from(["ROLE_USER".to_owned()]));
    Authorization::new(client, "alice", AuthorizationGrantType::AuthorizationCode)
        .with_authorized_scopes(BTreeSet::from(["read".to_owned()]))
        .with_principal(&principal)
        .unwrap()
        .with_attribute("state", Value::from("state-value"))
        .with_token(TokenSlot::AuthorizationCode, token("code-value"))
        .with_token(TokenSlot::AccessToken, token("access-value"))
        .with_token(TokenSlot::RefreshToken, token("refresh-value"))
        .with_token(TokenSlot::IdToken, token("id-value"))
        .with_token(TokenSlot::UserCode, token("user-code-value"))
        .with_token(TokenSlot::DeviceCode, token("device-code-value"))
}

#[tokio::test]
async fn test_every_lookup_key_finds_the_authorization() {
    let database = create_test_database().await.unwrap();
    let clients = database.registered_clients();
    let store = database.authorizations();
    let client = confidential_client("democlient", TokenFormat::Reference);
    clients.save(&client).await.unwrap();

    let authorization = full_authorization(&client);
    store.save(&authorization).await.unwrap();

    let keys = [
        ("state-value", OAuth2TokenType::State),
        ("code-value", OAuth2TokenType::AUTHORIZATION_CODE),
        ("access-value", OAuth2TokenType::ACCESS_TOKEN),
        ("refresh-value", OAuth2TokenType::REFRESH_TOKEN),
        ("id-value", OAuth2TokenType::ID_TOKEN),
        ("user-code-value", OAuth2TokenType::USER_CODE),
        ("device-code-value", OAuth2TokenType::DEVICE_CODE),
    ];
    for (value, token_type) in keys {
        let hinted = store.find_by_token(value, Some(token_type)).await.unwrap();
        assert_eq!(hinted.map(|a| a.id), Some(authorization.id.clone()), "{value}");
        let unhinted = store.find_by_token(value, None).await.unwrap();
        assert_eq!(unhinted.map(|a| a.id), Some(authorization.id.clone()), "{value}");
    }

    // A hint restricts the search to one slot
    assert!(store
        .find_by_token("access-value", Some(OAuth2TokenType::REFRESH_TOKEN))
        .await
        .unwrap()
        .is_none());
    assert!(store.find_by_token("missing", None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_stored_authorization_round_trips() {
    let database = create_test_database().await.unwrap();
    let clients = database.registered_clients();
    let store = database.authorizations();
    let client = confidential_client("democlient", TokenFormat::Reference);
    clients.save(&client).await.unwrap();

    let mut authorization = full_authorization(&client);
    authorization.invalidate(TokenSlot::AuthorizationCode);
    store.save(&authorization).await.unwrap();

    let loaded = store.find_by_id(&authorization.id).await.unwrap().unwrap();
    assert_eq!(loaded.principal_name, "alice");
    assert_eq!(loaded.registered_client_id, client.id);
    assert_eq!(loaded.authorized_scopes, authorization.authorized_scopes);
    assert_eq!(loaded.state(), Some("state-value"));
    assert!(loaded.token(TokenSlot::AuthorizationCode).unwrap().is_invalidated());
    assert!(loaded.access_token().unwrap().is_active());
    assert_eq!(loaded.principal().unwrap().unwrap().name, "alice");
}

#[tokio::test]
async fn test_lookup_precedence_without_hint() {
    let database = create_test_database().await.unwrap();
    let clients = database.registered_clients();
    let store = database.authorizations();
    let client = confidential_client("democlient", TokenFormat::Reference);
    clients.save(&client).await.unwrap();

    // The same value sits in the access slot of one and the refresh slot of another
    let by_refresh = Authorization::new(&client, "bob", AuthorizationGrantType::Password)
        .with_token(TokenSlot::RefreshToken, token("shared"));
    let by_access = Authorization::new(&client, "alice", AuthorizationGrantType::Password)
        .with_token(TokenSlot::AccessToken, token("shared"));
    store.save(&by_refresh).await.unwrap();
    store.save(&by_access).await.unwrap();

    let found = store.find_by_token("shared", None).await.unwrap().unwrap();
    assert_eq!(found.id, by_access.id);
}

#[tokio::test]
async fn test_save_replaces_and_remove_is_idempotent() {
    let database = create_test_database().await.unwrap();
    let clients = database.registered_clients();
    let store = database.authorizations();
    let client = confidential_client("democlient", TokenFormat::Reference);
    clients.save(&client).await.unwrap();

    let mut authorization = Authorization::new(&client, "alice", AuthorizationGrantType::Password)
        .with_token(TokenSlot::AccessToken, token("first"));
    store.save(&authorization).await.unwrap();

    authorization.put_token(TokenSlot::AccessToken, token("second"));
    store.save(&authorization).await.unwrap();
    assert!(store.find_by_token("first", None).await.unwrap().is_none());
    let found = store.find_by_token("second", None).await.unwrap().unwrap();
    assert_eq!(found.id, authorization.id);

    store.remove(&authorization).await.unwrap();
    store.remove(&authorization).await.unwrap();
    store.remove_by_id("never-stored").await.unwrap();
    assert!(store.find_by_id(&authorization.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_client_with_custom_vocabulary_round_trips() {
    let database = create_test_database().await.unwrap();
    let clients = database.registered_clients();

    let mut client = confidential_client("extension", TokenFormat::SelfContained);
    client
        .authorization_grant_types
        .insert(AuthorizationGrantType::from("urn:example:grant:custom"));
    client
        .client_authentication_methods
        .insert(ClientAuthenticationMethod::from("private_key_jwt"));
    client.token_settings.reuse_refresh_tokens = false;
    client.token_settings.access_token_time_to_live = Duration::minutes(10);
    clients.save(&client).await.unwrap();

    let loaded = clients.find_by_client_id("extension").await.unwrap().unwrap();
    assert_eq!(loaded.id, client.id);
    assert!(loaded
        .authorization_grant_types
        .contains(&AuthorizationGrantType::Custom("urn:example:grant:custom".to_owned())));
    assert!(loaded
        .client_authentication_methods
        .contains(&ClientAuthenticationMethod::PrivateKeyJwt));
    assert_eq!(loaded.scopes, client.scopes);
    assert_eq!(loaded.redirect_uris, client.redirect_uris);
    assert_eq!(loaded.token_settings.access_token_format, TokenFormat::SelfContained);
    assert_eq!(
        loaded.token_settings.access_token_time_to_live,
        Duration::minutes(10)
    );
    assert!(!loaded.token_settings.reuse_refresh_tokens);

    let by_id = clients.find_by_id(&client.id).await.unwrap().unwrap();
    assert_eq!(by_id.client_id, "extension");
}

#[tokio::test]
async fn test_missing_and_duplicate_clients() {
    let database = create_test_database().await.unwrap();
    let clients = database.registered_clients();

    assert!(clients.find_by_client_id("nobody").await.unwrap().is_none());
    assert!(clients.find_by_id("nobody").await.unwrap().is_none());

    clients
        .save(&confidential_client("democlient", TokenFormat::Reference))
        .await
        .unwrap();
    // Same client_id under a different internal id
    let error = clients
        .save(&confidential_client("democlient", TokenFormat::Reference))
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::ResourceAlreadyExists);
}
