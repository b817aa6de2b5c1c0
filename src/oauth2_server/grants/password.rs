// ABOUTME: Resource owner password credentials grant
// ABOUTME: Authenticates the user, negotiates scopes and persists access/refresh/ID tokens atomically
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::{ensure_grant_allowed, issue_tokens, negotiate_scopes, AccessTokenResult, GrantServices};
use crate::constants::oauth2::{params, ADDITIONAL_PARAMETERS_ATTRIBUTE};
use crate::oauth2_server::authentication::AuthenticationManager;
use crate::oauth2_server::authorization::Authorization;
use crate::oauth2_server::models::OAuth2Error;
use crate::oauth2_server::parameters::RequestParameters;
use crate::oauth2_server::registered_client::RegisteredClient;
use crate::oauth2_server::token_generator::TokenContext;
use crate::oauth2_server::types::{AuthorizationGrantType, TokenSlot};

/// A parsed `grant_type=password` request
#[derive(Clone)]
pub struct PasswordGrantRequest {
    /// Resource owner username
    pub username: String,
    /// Resource owner password
    pub password: String,
    /// Requested scopes, `None` when the request carried no `scope`
    pub scopes: Option<BTreeSet<String>>,
    /// Every non-reserved request parameter
    pub additional_parameters: Map<String, Value>,
}

impl fmt::Debug for PasswordGrantRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordGrantRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("additional_parameters", &self.additional_parameters)
            .finish()
    }
}

impl PasswordGrantRequest {
    /// Convert token endpoint parameters using the configured credential names
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` if the username or password is missing or
    /// repeated, or `scope` is repeated
    pub fn from_parameters(
        parameters: &RequestParameters,
        username_parameter: &str,
        password_parameter: &str,
    ) -> Result<Self, OAuth2Error> {
        let username = parameters.required(username_parameter)?.to_owned();
        let password = parameters.required(password_parameter)?.to_owned();
        let scopes = parameters.scopes()?;
        let additional_parameters = parameters.additional_parameters(&[
            params::GRANT_TYPE,
            params::SCOPE,
            params::CLIENT_ID,
            params::CLIENT_SECRET,
            username_parameter,
            password_parameter,
        ]);

        Ok(Self {
            username,
            password,
            scopes,
            additional_parameters,
        })
    }
}

/// Issues tokens for `grant_type=password`
pub struct PasswordGrantProvider {
    services: GrantServices,
    authentication_manager: Arc<dyn AuthenticationManager>,
    username_parameter_name: String,
    password_parameter_name: String,
}

impl PasswordGrantProvider {
    /// Create the provider
    #[must_use]
    pub fn new(
        services: GrantServices,
        authentication_manager: Arc<dyn AuthenticationManager>,
        username_parameter_name: impl Into<String>,
        password_parameter_name: impl Into<String>,
    ) -> Self {
        Self {
            services,
            authentication_manager,
            username_parameter_name: username_parameter_name.into(),
            password_parameter_name: password_parameter_name.into(),
        }
    }

    /// Form parameter carrying the username
    #[must_use]
    pub fn username_parameter_name(&self) -> &str {
        &self.username_parameter_name
    }

    /// Form parameter carrying the password
    #[must_use]
    pub fn password_parameter_name(&self) -> &str {
        &self.password_parameter_name
    }

    /// Execute the grant for an authenticated client
    ///
    /// Nothing is persisted unless every token was issued.
    ///
    /// # Errors
    ///
    /// `unauthorized_client` if the client lacks the password grant,
    /// `invalid_grant` for bad credentials, `invalid_scope` for scopes outside
    /// the client's registration and `server_error` if a required token could
    /// not be generated or the authorization could not be saved
    pub async fn grant(
        &self,
        client: &RegisteredClient,
        request: PasswordGrantRequest,
    ) -> Result<AccessTokenResult, OAuth2Error> {
        trace!(client_id = %client.client_id, "Retrieved registered client");
        let grant_type = AuthorizationGrantType::Password;
        ensure_grant_allowed(client, &grant_type)?;

        let principal = self
            .authentication_manager
            .authenticate(&request.username, &request.password)
            .await?;

        let authorized_scopes =
            negotiate_scopes(request.scopes, &client.scopes, client.scopes.clone())?; // Safe: default scopes are an owned copy
        trace!(client_id = %client.client_id, "Validated token request parameters");

        let mut authorization = Authorization::new(client, &request.username, grant_type.clone()) // Safe: aggregate owns its grant type
            .with_authorized_scopes(authorized_scopes.clone()) // Safe: aggregate owns its scopes
            .with_principal(&principal)?;
        if !request.additional_parameters.is_empty() {
            authorization = authorization.with_attribute(
                ADDITIONAL_PARAMETERS_ATTRIBUTE,
                Value::Object(request.additional_parameters),
            );
        }

        let context = TokenContext {
            registered_client: client,
            principal: &principal,
            authorization: None,
            authorized_scopes: &authorized_scopes,
            grant_type: &grant_type,
            token_type: TokenSlot::AccessToken,
            issuer: self.services.issuer.as_deref(),
        };
        let (authorization, result) =
            issue_tokens(&self.services, context, authorization, true, true).await?;

        self.services.authorizations.save(&authorization).await?;
        debug!(
            client_id = %client.client_id,
            authorization_id = %authorization.id,
            refresh_token = result.refresh_token.is_some(),
            id_token = !result.additional_parameters.is_empty(),
            "Saved password grant authorization"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_conversion_uses_configured_names() {
        let parameters = RequestParameters::parse(
            b"grant_type=password&login=demo&secret=pw&scope=read&client_id=democlient&device=tv",
        );
        let request = PasswordGrantRequest::from_parameters(&parameters, "login", "secret").unwrap();
        assert_eq!(request.username, "demo");
        assert_eq!(request.password, "pw");
        assert_eq!(request.scopes, Some(["read".to_owned()].into()));
        assert_eq!(request.additional_parameters.len(), 1);
        assert_eq!(request.additional_parameters["device"], "tv");
        assert!(!format!("{request:?}").contains("pw\""));
    }

    #[test]
    fn test_request_conversion_rejects_missing_password() {
        let parameters = RequestParameters::parse(b"grant_type=password&username=demo");
        let error =
            PasswordGrantRequest::from_parameters(&parameters, "username", "password").unwrap_err();
        assert_eq!(error.error, "invalid_request");
        assert_eq!(
            error.error_description.as_deref(),
            Some("OAuth 2.0 Parameter: password")
        );
    }
}
