// ABOUTME: Grant providers and the token endpoint dispatcher
// ABOUTME: Shared scope checks and the access/refresh/ID token issuance sequence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Grant providers
//!
//! One provider per grant type. Each provider validates the request against
//! the authenticated client, asks the [`DelegatingTokenGenerator`] for tokens,
//! assembles the resulting [`Authorization`] in memory and persists it with a
//! single `save` at the very end. A failure at any step therefore leaves no
//! record behind.

pub mod authorization_code;
pub mod client_credentials;
pub mod device_code;
pub mod password;
pub mod refresh_token;

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::http::HeaderMap;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::authorization::{Authorization, OAuth2Token};
use super::client_authentication::ClientAuthenticator;
use super::models::{OAuth2Error, TokenResponse};
use super::parameters::{join_scopes, RequestParameters};
use super::registered_client::RegisteredClient;
use super::store::AuthorizationService;
use super::token_generator::{DelegatingTokenGenerator, TokenContext};
use super::types::{AuthorizationGrantType, TokenSlot};
use crate::constants::oauth2::{params, BEARER_TOKEN_TYPE, OPENID_SCOPE};

pub use authorization_code::{AuthorizationCodeGrantProvider, AuthorizationRequest};
pub use client_credentials::ClientCredentialsGrantProvider;
pub use device_code::DeviceCodeGrantProvider;
pub use password::{PasswordGrantProvider, PasswordGrantRequest};
pub use refresh_token::RefreshTokenGrantProvider;

/// Collaborators shared by every grant provider
#[derive(Clone)]
pub struct GrantServices {
    /// Authorization store
    pub authorizations: Arc<dyn AuthorizationService>,
    /// Token generator chain
    pub token_generator: Arc<DelegatingTokenGenerator>,
    /// Issuer placed in token claims
    pub issuer: Option<String>,
}

/// Outcome of a successful grant
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// Issued access token
    pub access_token: OAuth2Token,
    /// Refresh token, when one applies
    pub refresh_token: Option<OAuth2Token>,
    /// Extra response parameters (`id_token`)
    pub additional_parameters: Map<String, Value>,
}

impl From<AccessTokenResult> for TokenResponse {
    fn from(result: AccessTokenResult) -> Self {
        Self {
            expires_in: result.access_token.expires_in(),
            scope: join_scopes(&result.access_token.scopes),
            token_type: result
                .access_token
                .token_type
                .unwrap_or_else(|| BEARER_TOKEN_TYPE.to_owned()),
            access_token: result.access_token.value,
            refresh_token: result.refresh_token.map(|token| token.value),
            additional_parameters: result.additional_parameters,
        }
    }
}

/// Fail with `unauthorized_client` unless the client may use the grant
pub(crate) fn ensure_grant_allowed(
    client: &RegisteredClient,
    grant_type: &AuthorizationGrantType,
) -> Result<(), OAuth2Error> {
    if client.allows_grant_type(grant_type) {
        return Ok(());
    }
    debug!(
        client_id = %client.client_id,
        grant_type = %grant_type,
        "Requested grant_type is not allowed for registered client"
    );
    Err(OAuth2Error::unauthorized_client(&format!(
        "Client is not authorized for grant type {grant_type}"
    )))
}

/// Requested scopes must be a subset of `allowed`; absent scopes yield `default`
pub(crate) fn negotiate_scopes(
    requested: Option<BTreeSet<String>>,
    allowed: &BTreeSet<String>,
    default: BTreeSet<String>,
) -> Result<BTreeSet<String>, OAuth2Error> {
    match requested {
        Some(requested) if !requested.is_empty() => {
            if let Some(unauthorized) = requested.difference(allowed).next() {
                debug!(scope = %unauthorized, "Requested scope is not allowed");
                return Err(OAuth2Error::invalid_scope(&format!(
                    "Scope '{unauthorized}' is not allowed"
                )));
            }
            Ok(requested)
        }
        _ => Ok(default),
    }
}

/// Issue access, optional refresh and optional ID tokens into `authorization`
///
/// Tokens are generated in that fixed order. The ID token is issued only when
/// requested and `openid` was authorized; it sees the authorization
/// assembled so far.
pub(crate) async fn issue_tokens(
    services: &GrantServices,
    context: TokenContext<'_>,
    mut authorization: Authorization,
    with_refresh_token: bool,
    with_id_token: bool,
) -> Result<(Authorization, AccessTokenResult), OAuth2Error> {
    let generator = &services.token_generator;

    let access_token = generator
        .generate(&context.for_token(TokenSlot::AccessToken))
        .await?;
    authorization.put_token(TokenSlot::AccessToken, access_token.clone()); // Safe: aggregate and response each own a copy

    let mut refresh_token = None;
    if with_refresh_token
        && context
            .registered_client
            .allows_grant_type(&AuthorizationGrantType::RefreshToken)
    {
        if let Some(token) = generator
            .try_generate(&context.for_token(TokenSlot::RefreshToken))
            .await?
        {
            authorization.put_token(TokenSlot::RefreshToken, token.clone()); // Safe: aggregate and response each own a copy
            refresh_token = Some(token);
        }
    }

    let mut additional_parameters = Map::new();
    if with_id_token && context.authorized_scopes.contains(OPENID_SCOPE) {
        let id_token = generator
            .generate(
                &context
                    .for_token(TokenSlot::IdToken)
                    .with_authorization(&authorization),
            )
            .await?;
        additional_parameters.insert(
            params::ID_TOKEN.to_owned(),
            Value::from(id_token.value.as_str()),
        );
        authorization.put_token(TokenSlot::IdToken, id_token);
    }

    Ok((
        authorization,
        AccessTokenResult {
            access_token,
            refresh_token,
            additional_parameters,
        },
    ))
}

/// `POST /oauth2/token`: authenticates the client and dispatches by `grant_type`
pub struct TokenEndpoint {
    client_authenticator: ClientAuthenticator,
    password: PasswordGrantProvider,
    client_credentials: ClientCredentialsGrantProvider,
    authorization_code: Arc<AuthorizationCodeGrantProvider>,
    refresh_token: RefreshTokenGrantProvider,
    device_code: Arc<DeviceCodeGrantProvider>,
}

impl TokenEndpoint {
    /// Assemble the endpoint from its providers
    #[must_use]
    pub fn new(
        client_authenticator: ClientAuthenticator,
        password: PasswordGrantProvider,
        client_credentials: ClientCredentialsGrantProvider,
        authorization_code: Arc<AuthorizationCodeGrantProvider>,
        refresh_token: RefreshTokenGrantProvider,
        device_code: Arc<DeviceCodeGrantProvider>,
    ) -> Self {
        Self {
            client_authenticator,
            password,
            client_credentials,
            authorization_code,
            refresh_token,
            device_code,
        }
    }

    /// Handle a token request
    ///
    /// # Errors
    ///
    /// Returns the OAuth2 error of the failing step
    pub async fn handle(
        &self,
        headers: &HeaderMap,
        parameters: &RequestParameters,
    ) -> Result<TokenResponse, OAuth2Error> {
        let client = self
            .client_authenticator
            .authenticate(headers, parameters)
            .await?;
        let grant_type = AuthorizationGrantType::from(parameters.required(params::GRANT_TYPE)?);

        let result = match &grant_type {
            AuthorizationGrantType::Password => {
                let request = PasswordGrantRequest::from_parameters(
                    parameters,
                    self.password.username_parameter_name(),
                    self.password.password_parameter_name(),
                )?;
                self.password.grant(&client, request).await
            }
            AuthorizationGrantType::ClientCredentials => {
                self.client_credentials.grant(&client, parameters).await
            }
            AuthorizationGrantType::AuthorizationCode => {
                self.authorization_code.grant(&client, parameters).await
            }
            AuthorizationGrantType::RefreshToken => {
                self.refresh_token.grant(&client, parameters).await
            }
            AuthorizationGrantType::DeviceCode => self.device_code.grant(&client, parameters).await,
            other => {
                debug!(client_id = %client.client_id, grant_type = %other, "Unsupported grant type");
                Err(OAuth2Error::unsupported_grant_type())
            }
        };

        match result {
            Ok(result) => {
                info!(client_id = %client.client_id, grant_type = %grant_type, "Issued access token");
                Ok(result.into())
            }
            Err(error) => {
                info!(
                    client_id = %client.client_id,
                    grant_type = %grant_type,
                    error = %error,
                    "Token request rejected"
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn scopes(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_negotiate_scopes() {
        let allowed = scopes(&["openid", "read"]);
        assert_eq!(
            negotiate_scopes(None, &allowed, allowed.clone()).unwrap(),
            allowed
        );
        assert_eq!(
            negotiate_scopes(Some(scopes(&["read"])), &allowed, allowed.clone()).unwrap(),
            scopes(&["read"])
        );
        assert_eq!(
            negotiate_scopes(Some(scopes(&["admin"])), &allowed, allowed.clone())
                .unwrap_err()
                .error,
            "invalid_scope"
        );
    }

    #[test]
    fn test_token_response_from_result() {
        let now = Utc::now();
        let mut access_token =
            OAuth2Token::new("abc", now, Some(now + chrono::Duration::seconds(3600)));
        access_token.scopes = scopes(&["read", "write"]);
        access_token.token_type = Some(BEARER_TOKEN_TYPE.to_owned());

        let response = TokenResponse::from(AccessTokenResult {
            access_token,
            refresh_token: None,
            additional_parameters: Map::new(),
        });
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.scope.as_deref(), Some("read write"));
        assert_eq!(response.token_type, "Bearer");
        assert!(response.refresh_token.is_none());
    }
}
