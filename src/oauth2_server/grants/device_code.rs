// ABOUTME: Device authorization grant (RFC 8628): device authorization, user verification, polling
// ABOUTME: Polling yields authorization_pending, slow_down, access_denied or expired_token until approved
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::BTreeSet;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use super::{ensure_grant_allowed, issue_tokens, negotiate_scopes, AccessTokenResult, GrantServices};
use crate::constants::oauth2::{
    params, DEVICE_DENIED_ATTRIBUTE, DEVICE_LAST_POLLED_ATTRIBUTE, DEVICE_POLL_INTERVAL_SECS,
};
use crate::oauth2_server::authorization::Authorization;
use crate::oauth2_server::models::{DeviceAuthorizationResponse, OAuth2Error};
use crate::oauth2_server::parameters::RequestParameters;
use crate::oauth2_server::principal::AuthenticatedPrincipal;
use crate::oauth2_server::registered_client::RegisteredClient;
use crate::oauth2_server::token_generator::TokenContext;
use crate::oauth2_server::types::{AuthorizationGrantType, OAuth2TokenType, TokenSlot};

/// Device authorization, verification and `grant_type=device_code` polling
pub struct DeviceCodeGrantProvider {
    services: GrantServices,
    verification_uri: String,
}

impl DeviceCodeGrantProvider {
    /// Create the provider
    #[must_use]
    pub fn new(services: GrantServices, verification_uri: impl Into<String>) -> Self {
        Self {
            services,
            verification_uri: verification_uri.into(),
        }
    }

    /// Start a device flow: issue and store a device code and a user code
    ///
    /// # Errors
    ///
    /// `unauthorized_client`, `invalid_scope`, or `server_error` on
    /// generation or storage failure
    pub async fn authorize_device(
        &self,
        client: &RegisteredClient,
        parameters: &RequestParameters,
    ) -> Result<DeviceAuthorizationResponse, OAuth2Error> {
        let grant_type = AuthorizationGrantType::DeviceCode;
        ensure_grant_allowed(client, &grant_type)?;
        let authorized_scopes =
            negotiate_scopes(parameters.scopes()?, &client.scopes, BTreeSet::new())?;

        // The owner is unknown until verification; the client stands in
        let principal = AuthenticatedPrincipal::client(client.client_id.as_str());
        let context = TokenContext {
            registered_client: client,
            principal: &principal,
            authorization: None,
            authorized_scopes: &authorized_scopes,
            grant_type: &grant_type,
            token_type: TokenSlot::DeviceCode,
            issuer: self.services.issuer.as_deref(),
        };
        let generator = &self.services.token_generator;
        let device_code = generator.generate(&context).await?;
        let user_code = generator
            .generate(&context.for_token(TokenSlot::UserCode))
            .await?;

        let response = DeviceAuthorizationResponse {
            device_code: device_code.value.clone(), // Safe: response and aggregate each own a copy
            verification_uri_complete: self.verification_uri_complete(&user_code.value),
            user_code: user_code.value.clone(), // Safe: response and aggregate each own a copy
            verification_uri: self.verification_uri.clone(), // Safe: response owns its URI
            expires_in: device_code.expires_in(),
            interval: DEVICE_POLL_INTERVAL_SECS,
        };

        let authorization = Authorization::new(client, client.client_id.as_str(), grant_type)
            .with_authorized_scopes(authorized_scopes)
            .with_token(TokenSlot::DeviceCode, device_code)
            .with_token(TokenSlot::UserCode, user_code);
        self.services.authorizations.save(&authorization).await?;

        debug!(client_id = %client.client_id, authorization_id = %authorization.id, "Issued device code");
        Ok(response)
    }

    fn verification_uri_complete(&self, user_code: &str) -> String {
        let separator = if self.verification_uri.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}user_code={}",
            self.verification_uri,
            urlencoding::encode(user_code)
        )
    }

    /// Record the resource owner's decision for a user code
    ///
    /// Approval binds the owner to the authorization and consumes the user
    /// code. Denial consumes both codes and marks the flow denied. The code
    /// is matched without regard to case or surrounding whitespace.
    ///
    /// # Errors
    ///
    /// `invalid_grant` for an unknown, used or expired user code
    pub async fn verify_user_code(
        &self,
        user_code: &str,
        principal: &AuthenticatedPrincipal,
        approve: bool,
    ) -> Result<(), OAuth2Error> {
        // User codes are issued in upper case
        let user_code = user_code.trim().to_ascii_uppercase();
        let Some(mut authorization) = self
            .services
            .authorizations
            .find_by_token(&user_code, Some(OAuth2TokenType::USER_CODE))
            .await?
        else {
            return Err(OAuth2Error::invalid_grant("Unknown user code"));
        };
        if !authorization
            .token(TokenSlot::UserCode)
            .is_some_and(|token| token.is_active())
        {
            return Err(OAuth2Error::invalid_grant("User code is no longer valid"));
        }

        if approve {
            authorization = authorization.with_principal(principal)?;
            authorization.principal_name = principal.name.clone(); // Safe: aggregate owns the principal name
            authorization.invalidate(TokenSlot::UserCode);
        } else {
            authorization
                .attributes
                .insert(DEVICE_DENIED_ATTRIBUTE.to_owned(), Value::Bool(true));
            authorization.invalidate(TokenSlot::UserCode);
            authorization.invalidate(TokenSlot::DeviceCode);
        }

        self.services.authorizations.save(&authorization).await?;
        info!(
            authorization_id = %authorization.id,
            username = %principal.name,
            approved = approve,
            "Device authorization decided"
        );
        Ok(())
    }

    /// Poll with a device code
    ///
    /// # Errors
    ///
    /// `expired_token`, `access_denied`, `authorization_pending` or
    /// `slow_down` per RFC 8628 section 3.5; `invalid_grant` for an unknown,
    /// foreign or already exchanged device code
    pub async fn grant(
        &self,
        client: &RegisteredClient,
        parameters: &RequestParameters,
    ) -> Result<AccessTokenResult, OAuth2Error> {
        let grant_type = AuthorizationGrantType::DeviceCode;
        ensure_grant_allowed(client, &grant_type)?;

        let value = parameters.required(params::DEVICE_CODE)?;
        let Some(mut authorization) = self
            .services
            .authorizations
            .find_by_token(value, Some(OAuth2TokenType::DEVICE_CODE))
            .await?
        else {
            return Err(OAuth2Error::invalid_grant("Unknown device code"));
        };
        if authorization.registered_client_id != client.id {
            return Err(OAuth2Error::invalid_grant("Device code was issued to another client"));
        }

        let now = Utc::now();
        let Some(device_code) = authorization.token(TokenSlot::DeviceCode) else {
            return Err(OAuth2Error::invalid_grant("Unknown device code"));
        };
        if device_code.is_expired_at(now) {
            return Err(OAuth2Error::expired_token());
        }
        if authorization
            .attributes
            .get(DEVICE_DENIED_ATTRIBUTE)
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Err(OAuth2Error::access_denied());
        }
        if device_code.is_invalidated() {
            return Err(OAuth2Error::invalid_grant("Device code has already been used"));
        }

        let pending = authorization
            .token(TokenSlot::UserCode)
            .is_some_and(|token| !token.is_invalidated());
        if pending {
            let last_polled = authorization
                .attributes
                .get(DEVICE_LAST_POLLED_ATTRIBUTE)
                .and_then(Value::as_i64);
            authorization.attributes.insert(
                DEVICE_LAST_POLLED_ATTRIBUTE.to_owned(),
                Value::from(now.timestamp()),
            );
            self.services.authorizations.save(&authorization).await?;
            return Err(match last_polled {
                Some(at) if now.timestamp() - at < DEVICE_POLL_INTERVAL_SECS => {
                    OAuth2Error::slow_down()
                }
                _ => OAuth2Error::authorization_pending(),
            });
        }

        let principal = authorization
            .principal()?
            .ok_or_else(|| OAuth2Error::server_error("Device authorization principal is missing"))?;
        let authorized_scopes = authorization.authorized_scopes.clone(); // Safe: scopes outlive the move of the aggregate
        let context = TokenContext {
            registered_client: client,
            principal: &principal,
            authorization: None,
            authorized_scopes: &authorized_scopes,
            grant_type: &grant_type,
            token_type: TokenSlot::AccessToken,
            issuer: self.services.issuer.as_deref(),
        };
        let (mut authorization, result) =
            issue_tokens(&self.services, context, authorization, true, true).await?;
        authorization.invalidate(TokenSlot::DeviceCode);

        self.services.authorizations.save(&authorization).await?;
        debug!(client_id = %client.client_id, authorization_id = %authorization.id, "Exchanged device code");
        Ok(result)
    }
}
