// ABOUTME: Opaque token introspection and token revocation over the authorization store
// ABOUTME: Rebuilds the principal behind an access token and deletes authorizations on logout
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::authorization::Authorization;
use super::authentication::UserDetailsService;
use super::models::IntrospectionResponse;
use super::principal::AuthenticatedPrincipal;
use super::registered_client::RegisteredClient;
use super::store::AuthorizationService;
use super::types::{AuthorizationGrantType, OAuth2TokenType};
use crate::constants::oauth2::{BEARER_TOKEN_TYPE, USERNAME_ATTRIBUTE};
use crate::errors::{AppError, AppResult};

/// Message for every unusable bearer token
const INVALID_BEARER_TOKEN: &str = "Invalid bearer token";

/// Claims copied from an access token into an introspection response
const INTROSPECTION_CLAIMS: [&str; 7] = ["exp", "iat", "nbf", "sub", "aud", "iss", "jti"];

/// Resolves access tokens back to the principal they were issued for
#[derive(Clone)]
pub struct OpaqueTokenIntrospector {
    authorizations: Arc<dyn AuthorizationService>,
    users: Arc<dyn UserDetailsService>,
}

impl OpaqueTokenIntrospector {
    /// Create an introspector
    #[must_use]
    pub fn new(
        authorizations: Arc<dyn AuthorizationService>,
        users: Arc<dyn UserDetailsService>,
    ) -> Self {
        Self {
            authorizations,
            users,
        }
    }

    /// Resolve an access token to its principal
    ///
    /// For `client_credentials` the principal is built from the token claims
    /// alone. For every other grant the user is reloaded and the stored
    /// principal attributes, the user's current attributes and the token
    /// claims are merged in that order.
    ///
    /// # Errors
    ///
    /// `AuthInvalid` for an unknown, expired or invalidated token; a
    /// `ResourceNotFound` error when the user behind the token no longer exists
    pub async fn introspect(&self, token: &str) -> AppResult<AuthenticatedPrincipal> {
        let Some(authorization) = self
            .authorizations
            .find_by_token(token, Some(OAuth2TokenType::ACCESS_TOKEN))
            .await?
        else {
            debug!("Introspection miss for presented bearer token");
            return Err(AppError::auth_invalid(INVALID_BEARER_TOKEN));
        };
        let Some(access_token) = authorization.access_token().filter(|t| t.is_active()) else {
            debug!(authorization_id = %authorization.id, "Presented bearer token is no longer active");
            return Err(AppError::auth_invalid(INVALID_BEARER_TOKEN));
        };
        let claims = access_token.claims().cloned().unwrap_or_default(); // Safe: principal owns its claim copy

        if authorization.authorization_grant_type == AuthorizationGrantType::ClientCredentials {
            let mut principal = AuthenticatedPrincipal::client(authorization.principal_name.as_str());
            principal.authorities = access_token
                .scopes
                .iter()
                .map(|scope| format!("SCOPE_{scope}"))
                .collect();
            principal.attributes = claims;
            return Ok(principal);
        }

        let stored = authorization.principal()?;
        let user = self
            .users
            .load_user_by_username(&authorization.principal_name)
            .await?;
        let mut principal = user.to_principal();

        let mut attributes = stored.map(|p| p.attributes).unwrap_or_default();
        attributes.extend(principal.attributes);
        attributes.extend(claims);
        principal.attributes = attributes;
        Ok(principal)
    }

    /// RFC 7662 response for a token presented by an authenticated client
    ///
    /// Unknown, inactive and foreign tokens all yield `{"active": false}`.
    /// A hint naming the wrong token type only changes where the search starts.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store fails
    pub async fn introspection_response(
        &self,
        client: &RegisteredClient,
        token: &str,
        token_type_hint: Option<&str>,
    ) -> AppResult<IntrospectionResponse> {
        let hint = token_type_hint.and_then(OAuth2TokenType::from_hint);
        let found = match self.authorizations.find_by_token(token, hint).await? {
            // A wrong hint extends the search to every token type
            None if hint.is_some() => self.authorizations.find_by_token(token, None).await?,
            found => found,
        };
        let Some(authorization) = found else {
            return Ok(IntrospectionResponse::inactive());
        };
        if authorization.registered_client_id != client.id {
            return Ok(IntrospectionResponse::inactive());
        }
        let Some((slot, found)) = authorization
            .tokens
            .iter()
            .find(|(_, candidate)| candidate.value == token)
        else {
            return Ok(IntrospectionResponse::inactive());
        };
        if !found.is_active() {
            return Ok(IntrospectionResponse::inactive());
        }

        let mut claims = Map::new();
        claims.insert("client_id".to_owned(), Value::from(client.client_id.as_str()));
        claims.insert(
            USERNAME_ATTRIBUTE.to_owned(),
            Value::from(authorization.principal_name.as_str()),
        );
        if !found.scopes.is_empty() {
            let scope = found.scopes.iter().map(String::as_str).collect::<Vec<_>>();
            claims.insert("scope".to_owned(), Value::from(scope.join(" ")));
        }
        if found.token_type.is_some() {
            claims.insert("token_type".to_owned(), Value::from(BEARER_TOKEN_TYPE));
        }
        if let Some(token_claims) = found.claims() {
            for name in INTROSPECTION_CLAIMS {
                if let Some(value) = token_claims.get(name) {
                    claims.insert(name.to_owned(), value.clone()); // Safe: response owns its claims
                }
            }
        } else {
            if let Some(issued_at) = found.issued_at {
                claims.insert("iat".to_owned(), Value::from(issued_at.timestamp()));
            }
            if let Some(expires_at) = found.expires_at {
                claims.insert("exp".to_owned(), Value::from(expires_at.timestamp()));
            }
        }

        debug!(client_id = %client.client_id, token_slot = ?slot, "Introspected active token");
        Ok(IntrospectionResponse {
            active: true,
            claims,
        })
    }
}

/// Deletes authorizations on logout and RFC 7009 revocation
#[derive(Clone)]
pub struct TokenRevocationService {
    authorizations: Arc<dyn AuthorizationService>,
}

impl TokenRevocationService {
    /// Create the service
    #[must_use]
    pub fn new(authorizations: Arc<dyn AuthorizationService>) -> Self {
        Self { authorizations }
    }

    /// Delete the authorization owning an access token
    ///
    /// Logging out with an unknown or already revoked token succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store fails
    pub async fn logout(&self, access_token: &str) -> AppResult<()> {
        match self
            .authorizations
            .find_by_token(access_token, Some(OAuth2TokenType::ACCESS_TOKEN))
            .await?
        {
            Some(authorization) => self.remove(&authorization, "logout").await,
            None => {
                debug!("Logout for unknown token ignored");
                Ok(())
            }
        }
    }

    /// Revoke any token issued to the client (RFC 7009)
    ///
    /// Tokens belonging to other clients and unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store fails
    pub async fn revoke(
        &self,
        client: &RegisteredClient,
        token: &str,
        token_type_hint: Option<&str>,
    ) -> AppResult<()> {
        let hint = token_type_hint.and_then(OAuth2TokenType::from_hint);
        let found = match self.authorizations.find_by_token(token, hint).await? {
            // An unhelpful hint falls back to the full search
            None if hint.is_some() => self.authorizations.find_by_token(token, None).await?,
            found => found,
        };
        match found {
            Some(authorization) if authorization.registered_client_id == client.id => {
                self.remove(&authorization, "revocation").await
            }
            Some(_) => {
                debug!(client_id = %client.client_id, "Revocation of a foreign token ignored");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn remove(&self, authorization: &Authorization, reason: &str) -> AppResult<()> {
        self.authorizations.remove(authorization).await?;
        info!(
            authorization_id = %authorization.id,
            principal = %authorization.principal_name,
            reason,
            "Removed authorization"
        );
        Ok(())
    }
}
