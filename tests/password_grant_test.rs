// ABOUTME: Integration tests for the resource owner password grant
// ABOUTME: Covers scope negotiation, bad credentials and the no-partial-state guarantee
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::collections::BTreeSet;

use authz_server::oauth2_server::{
    parameters::RequestParameters, AuthorizationGrantType, OAuth2TokenType, SignatureAlgorithm,
    TokenFormat, TokenSlot,
};
use axum::http::{header, HeaderMap, HeaderValue};
use base64::{engine::general_purpose::STANDARD, Engine};
use common::{
    authorization_count, confidential_client, create_test_resources, create_test_user,
    register_client, CLIENT_SECRET, USER_PASSWORD,
};

fn basic(client_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value = format!("Basic {}", STANDARD.encode(format!("{client_id}:{CLIENT_SECRET}")));
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
    headers
}

fn password_request(username: &str, password: &str, scope: Option<&str>) -> RequestParameters {
    let mut fields = vec![
        ("grant_type", "password"),
        ("username", username),
        ("password", password),
    ];
    if let Some(scope) = scope {
        fields.push(("scope", scope));
    }
    RequestParameters::parse(serde_urlencoded::to_string(&fields).unwrap().as_bytes())
}

#[tokio::test]
async fn test_password_grant_issues_reference_tokens() {
    let resources = create_test_resources().await.unwrap();
    register_client(&resources, confidential_client("democlient", TokenFormat::Reference))
        .await
        .unwrap();
    create_test_user(&resources, "alice").await.unwrap();

    let response = resources
        .token_endpoint
        .handle(
            &basic("democlient"),
            &password_request("alice", USER_PASSWORD, Some("read write")),
        )
        .await
        .unwrap();

    assert_eq!(response.token_type, "Bearer");
    assert_eq!(response.expires_in, 3600);
    assert_eq!(response.scope.as_deref(), Some("read write"));
    assert!(response.refresh_token.is_some());
    assert!(!response.additional_parameters.contains_key("id_token"));
    // Reference tokens are lower-cased UUIDs, not JWTs
    assert_eq!(response.access_token.len(), 36);
    assert_eq!(response.access_token, response.access_token.to_lowercase());

    let authorization = resources
        .authorizations
        .find_by_token(&response.access_token, Some(OAuth2TokenType::ACCESS_TOKEN))
        .await
        .unwrap()
        .expect("authorization persisted");
    assert_eq!(authorization.principal_name, "alice");
    assert_eq!(
        authorization.authorization_grant_type,
        AuthorizationGrantType::Password
    );
    assert_eq!(
        authorization.authorized_scopes,
        BTreeSet::from(["read".to_owned(), "write".to_owned()])
    );
    let principal = authorization.principal().unwrap().expect("principal recorded");
    assert_eq!(principal.name, "alice");
}

#[tokio::test]
async fn test_password_grant_defaults_to_client_scopes_and_issues_id_token() {
    let resources = create_test_resources().await.unwrap();
    register_client(&resources, confidential_client("democlient", TokenFormat::Reference))
        .await
        .unwrap();
    create_test_user(&resources, "alice").await.unwrap();

    let response = resources
        .token_endpoint
        .handle(&basic("democlient"), &password_request("alice", USER_PASSWORD, None))
        .await
        .unwrap();

    assert_eq!(response.scope.as_deref(), Some("openid profile read write"));
    assert!(response.additional_parameters["id_token"].is_string());
}

#[tokio::test]
async fn test_openid_scope_issues_signed_id_token_for_owner() {
    let resources = create_test_resources().await.unwrap();
    register_client(&resources, confidential_client("democlient", TokenFormat::Reference))
        .await
        .unwrap();
    create_test_user(&resources, "alice").await.unwrap();

    let response = resources
        .token_endpoint
        .handle(
            &basic("democlient"),
            &password_request("alice", USER_PASSWORD, Some("openid profile")),
        )
        .await
        .unwrap();
    let id_token = response.additional_parameters["id_token"]
        .as_str()
        .expect("id_token in response");

    let key_set = resources.key_manager.signing_key_set().await.unwrap();
    let header = jsonwebtoken::decode_header(id_token).unwrap();
    assert_eq!(header.kid.as_deref(), Some(key_set.kid()));
    assert_eq!(header.alg, jsonwebtoken::Algorithm::RS256);

    let claims: serde_json::Value = key_set.verify(id_token).unwrap();
    assert_eq!(claims["sub"], "alice");
    assert_eq!(claims["aud"], serde_json::json!(["democlient"]));
    assert_eq!(claims["azp"], "democlient");
    assert_eq!(claims["iss"], common::ISSUER);
}

#[tokio::test]
async fn test_id_token_signing_failure_persists_nothing() {
    let resources = create_test_resources().await.unwrap();
    let mut client = confidential_client("ecclient", TokenFormat::Reference);
    client.token_settings.id_token_signature_algorithm = SignatureAlgorithm::ES256;
    register_client(&resources, client).await.unwrap();
    create_test_user(&resources, "alice").await.unwrap();

    let error = resources
        .token_endpoint
        .handle(
            &basic("ecclient"),
            &password_request("alice", USER_PASSWORD, Some("openid read")),
        )
        .await
        .unwrap_err();

    assert_eq!(error.error, "server_error");
    assert_eq!(authorization_count(&resources).await.unwrap(), 0);
}

#[tokio::test]
async fn test_no_refresh_token_without_refresh_grant() {
    let resources = create_test_resources().await.unwrap();
    let mut client = confidential_client("norefresh", TokenFormat::Reference);
    client
        .authorization_grant_types
        .remove(&AuthorizationGrantType::RefreshToken);
    register_client(&resources, client).await.unwrap();
    create_test_user(&resources, "alice").await.unwrap();

    let response = resources
        .token_endpoint
        .handle(&basic("norefresh"), &password_request("alice", USER_PASSWORD, Some("read")))
        .await
        .unwrap();
    assert!(response.refresh_token.is_none());

    let authorization = resources
        .authorizations
        .find_by_token(&response.access_token, Some(OAuth2TokenType::ACCESS_TOKEN))
        .await
        .unwrap()
        .expect("authorization stored");
    assert!(authorization.tokens.get(&TokenSlot::RefreshToken).is_none());
}

#[tokio::test]
async fn test_self_contained_access_token_is_a_jwt() {
    let resources = create_test_resources().await.unwrap();
    register_client(
        &resources,
        confidential_client("jwtclient", TokenFormat::SelfContained),
    )
    .await
    .unwrap();
    create_test_user(&resources, "alice").await.unwrap();

    let response = resources
        .token_endpoint
        .handle(&basic("jwtclient"), &password_request("alice", USER_PASSWORD, Some("read")))
        .await
        .unwrap();

    assert_eq!(response.access_token.split('.').count(), 3);
    let key_set = resources.key_manager.signing_key_set().await.unwrap();
    let claims: serde_json::Value = key_set.verify(&response.access_token).unwrap();
    assert_eq!(claims["sub"], "alice");
    assert_eq!(claims["iss"], common::ISSUER);
}

#[tokio::test]
async fn test_bad_credentials_do_not_reveal_unknown_users() {
    let resources = create_test_resources().await.unwrap();
    register_client(&resources, confidential_client("democlient", TokenFormat::Reference))
        .await
        .unwrap();
    create_test_user(&resources, "alice").await.unwrap();

    let wrong_password = resources
        .token_endpoint
        .handle(&basic("democlient"), &password_request("alice", "nope", None))
        .await
        .unwrap_err();
    let unknown_user = resources
        .token_endpoint
        .handle(&basic("democlient"), &password_request("mallory", "nope", None))
        .await
        .unwrap_err();

    assert_eq!(wrong_password.error, "invalid_grant");
    assert_eq!(wrong_password, unknown_user);
    assert_eq!(authorization_count(&resources).await.unwrap(), 0);
}

#[tokio::test]
async fn test_disallowed_grant_and_scope_persist_nothing() {
    let resources = create_test_resources().await.unwrap();
    let mut client = confidential_client("nopassword", TokenFormat::Reference);
    client
        .authorization_grant_types
        .remove(&AuthorizationGrantType::Password);
    register_client(&resources, client).await.unwrap();
    register_client(&resources, confidential_client("democlient", TokenFormat::Reference))
        .await
        .unwrap();
    create_test_user(&resources, "alice").await.unwrap();

    let unauthorized = resources
        .token_endpoint
        .handle(&basic("nopassword"), &password_request("alice", USER_PASSWORD, None))
        .await
        .unwrap_err();
    assert_eq!(unauthorized.error, "unauthorized_client");

    let bad_scope = resources
        .token_endpoint
        .handle(
            &basic("democlient"),
            &password_request("alice", USER_PASSWORD, Some("read admin")),
        )
        .await
        .unwrap_err();
    assert_eq!(bad_scope.error, "invalid_scope");

    assert_eq!(authorization_count(&resources).await.unwrap(), 0);
}

#[tokio::test]
async fn test_wrong_client_secret_is_invalid_client() {
    let resources = create_test_resources().await.unwrap();
    register_client(&resources, confidential_client("democlient", TokenFormat::Reference))
        .await
        .unwrap();

    let mut headers = HeaderMap::new();
    let value = format!("Basic {}", STANDARD.encode("democlient:wrong"));
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());

    let error = resources
        .token_endpoint
        .handle(&headers, &password_request("alice", USER_PASSWORD, None))
        .await
        .unwrap_err();
    assert_eq!(error.error, "invalid_client");
    assert_eq!(error.status().as_u16(), 401);
}
