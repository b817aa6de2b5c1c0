// ABOUTME: Client credentials grant: the client acts on its own behalf
// ABOUTME: Issues an access token only, with scopes limited to the client's registration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::BTreeSet;

use tracing::debug;

use super::{ensure_grant_allowed, issue_tokens, negotiate_scopes, AccessTokenResult, GrantServices};
use crate::oauth2_server::authorization::Authorization;
use crate::oauth2_server::models::OAuth2Error;
use crate::oauth2_server::parameters::RequestParameters;
use crate::oauth2_server::principal::AuthenticatedPrincipal;
use crate::oauth2_server::registered_client::RegisteredClient;
use crate::oauth2_server::token_generator::TokenContext;
use crate::oauth2_server::types::{AuthorizationGrantType, TokenSlot};

/// Issues tokens for `grant_type=client_credentials`
pub struct ClientCredentialsGrantProvider {
    services: GrantServices,
}

impl ClientCredentialsGrantProvider {
    /// Create the provider
    #[must_use]
    pub const fn new(services: GrantServices) -> Self {
        Self { services }
    }

    /// Execute the grant for an authenticated client
    ///
    /// # Errors
    ///
    /// `unauthorized_client`, `invalid_scope`, or `server_error` on generation
    /// or storage failure
    pub async fn grant(
        &self,
        client: &RegisteredClient,
        parameters: &RequestParameters,
    ) -> Result<AccessTokenResult, OAuth2Error> {
        let grant_type = AuthorizationGrantType::ClientCredentials;
        ensure_grant_allowed(client, &grant_type)?;

        let authorized_scopes =
            negotiate_scopes(parameters.scopes()?, &client.scopes, BTreeSet::new())?;
        let principal = AuthenticatedPrincipal::client(client.client_id.as_str());

        let authorization =
            Authorization::new(client, client.client_id.as_str(), grant_type.clone()) // Safe: aggregate owns its grant type
                .with_authorized_scopes(authorized_scopes.clone()) // Safe: aggregate owns its scopes
                .with_principal(&principal)?;

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
            issue_tokens(&self.services, context, authorization, false, false).await?;

        self.services.authorizations.save(&authorization).await?;
        debug!(client_id = %client.client_id, authorization_id = %authorization.id, "Saved client credentials authorization");
        Ok(result)
    }
}
