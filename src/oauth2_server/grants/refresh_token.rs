// ABOUTME: Refresh token grant: issues a new access token from an active refresh token
// ABOUTME: Rotates the refresh token unless the client keeps reusing it
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{ensure_grant_allowed, negotiate_scopes, AccessTokenResult, GrantServices};
use crate::constants::oauth2::{params, OPENID_SCOPE};
use crate::oauth2_server::models::OAuth2Error;
use crate::oauth2_server::parameters::RequestParameters;
use crate::oauth2_server::principal::AuthenticatedPrincipal;
use crate::oauth2_server::registered_client::RegisteredClient;
use crate::oauth2_server::token_generator::TokenContext;
use crate::oauth2_server::types::{AuthorizationGrantType, OAuth2TokenType, TokenSlot};

/// Issues tokens for `grant_type=refresh_token`
pub struct RefreshTokenGrantProvider {
    services: GrantServices,
}

impl RefreshTokenGrantProvider {
    /// Create the provider
    #[must_use]
    pub const fn new(services: GrantServices) -> Self {
        Self { services }
    }

    /// Execute the grant for an authenticated client
    ///
    /// The authorization is updated in place: a new access token, a new
    /// refresh token when `reuse_refresh_tokens` is off, and a new ID token
    /// when `openid` is among the authorized scopes.
    ///
    /// # Errors
    ///
    /// `invalid_grant` for an unknown, foreign, expired or invalidated
    /// refresh token; `invalid_scope` when asking for scopes beyond the
    /// original grant
    pub async fn grant(
        &self,
        client: &RegisteredClient,
        parameters: &RequestParameters,
    ) -> Result<AccessTokenResult, OAuth2Error> {
        let grant_type = AuthorizationGrantType::RefreshToken;
        ensure_grant_allowed(client, &grant_type)?;

        let value = parameters.required(params::REFRESH_TOKEN)?;
        let Some(mut authorization) = self
            .services
            .authorizations
            .find_by_token(value, Some(OAuth2TokenType::REFRESH_TOKEN))
            .await?
        else {
            return Err(OAuth2Error::invalid_grant("Unknown refresh token"));
        };

        if authorization.registered_client_id != client.id {
            warn!(client_id = %client.client_id, "Refresh token presented by a different client");
            return Err(OAuth2Error::invalid_grant("Refresh token was issued to another client"));
        }
        if !authorization.refresh_token().is_some_and(|token| token.is_active()) {
            return Err(OAuth2Error::invalid_grant("Refresh token is no longer active"));
        }

        let authorized_scopes = negotiate_scopes(
            parameters.scopes()?,
            &authorization.authorized_scopes,
            authorization.authorized_scopes.clone(), // Safe: default is an owned copy
        )?;
        let principal = authorization.principal()?.unwrap_or_else(|| {
            AuthenticatedPrincipal::client(authorization.principal_name.as_str())
        });

        let generator = &self.services.token_generator;
        let context = TokenContext {
            registered_client: client,
            principal: &principal,
            authorization: None,
            authorized_scopes: &authorized_scopes,
            grant_type: &grant_type,
            token_type: TokenSlot::AccessToken,
            issuer: self.services.issuer.as_deref(),
        };

        let access_token = generator.generate(&context).await?;
        authorization.put_token(TokenSlot::AccessToken, access_token.clone()); // Safe: aggregate and response each own a copy

        if !client.token_settings.reuse_refresh_tokens {
            if let Some(rotated) = generator
                .try_generate(&context.for_token(TokenSlot::RefreshToken))
                .await?
            {
                authorization.put_token(TokenSlot::RefreshToken, rotated);
            }
        }
        let refresh_token = authorization.refresh_token().cloned();

        let mut additional_parameters = Map::new();
        if authorized_scopes.contains(OPENID_SCOPE) {
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

        self.services.authorizations.save(&authorization).await?;
        debug!(
            client_id = %client.client_id,
            authorization_id = %authorization.id,
            rotated = !client.token_settings.reuse_refresh_tokens,
            "Refreshed access token"
        );

        Ok(AccessTokenResult {
            access_token,
            refresh_token,
            additional_parameters,
        })
    }
}
