// ABOUTME: Authorization code grant with PKCE: authorization requests and code exchange
// ABOUTME: Codes are single use; a replayed code revokes the tokens issued from it
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::BTreeSet;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use url::Url;

use super::{ensure_grant_allowed, issue_tokens, negotiate_scopes, AccessTokenResult, GrantServices};
use crate::constants::oauth2::{params, AUTHORIZATION_REQUEST_ATTRIBUTE, STATE_ATTRIBUTE};
use crate::errors::AppError;
use crate::oauth2_server::authorization::Authorization;
use crate::oauth2_server::models::OAuth2Error;
use crate::oauth2_server::parameters::{parse_scopes, RequestParameters};
use crate::oauth2_server::principal::AuthenticatedPrincipal;
use crate::oauth2_server::registered_client::RegisteredClient;
use crate::oauth2_server::store::RegisteredClientRepository;
use crate::oauth2_server::token_generator::{random_code, TokenContext};
use crate::oauth2_server::types::{AuthorizationGrantType, OAuth2TokenType, TokenSlot};

/// PKCE transformation (RFC 7636 section 4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// `BASE64URL(SHA256(verifier))`
    S256,
    /// Verifier sent as-is
    #[serde(rename = "plain")]
    Plain,
}

impl CodeChallengeMethod {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "S256" => Some(Self::S256),
            "plain" => Some(Self::Plain),
            _ => None,
        }
    }

    /// Constant-time check of a verifier against a challenge
    #[must_use]
    pub fn verify(self, verifier: &str, challenge: &str) -> bool {
        let computed = match self {
            Self::S256 => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
            Self::Plain => verifier.to_owned(),
        };
        computed.as_bytes().ct_eq(challenge.as_bytes()).into()
    }
}

/// A validated-shape `response_type=code` authorization request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Requesting client
    pub client_id: String,
    /// Redirect URI as sent by the client, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// Requested scopes
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    /// Opaque client state echoed on redirect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// PKCE challenge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    /// PKCE method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<CodeChallengeMethod>,
    /// OIDC nonce copied into the ID token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl AuthorizationRequest {
    /// Convert authorize endpoint parameters
    ///
    /// # Errors
    ///
    /// `unsupported_response_type` unless `response_type=code`;
    /// `invalid_request` for missing or repeated parameters or an unknown
    /// PKCE method
    pub fn from_parameters(parameters: &RequestParameters) -> Result<Self, OAuth2Error> {
        let client_id = parameters.required(params::CLIENT_ID)?.to_owned();
        if parameters.required("response_type")? != "code" {
            return Err(OAuth2Error::unsupported_response_type());
        }

        let code_challenge = parameters.single("code_challenge")?.map(str::to_owned);
        let code_challenge_method = match parameters.single("code_challenge_method")? {
            Some(method) => Some(CodeChallengeMethod::parse(method).ok_or_else(|| {
                OAuth2Error::invalid_request("OAuth 2.0 Parameter: code_challenge_method")
            })?),
            None if code_challenge.is_some() => Some(CodeChallengeMethod::Plain),
            None => None,
        };

        Ok(Self {
            client_id,
            redirect_uri: parameters.single(params::REDIRECT_URI)?.map(str::to_owned),
            scopes: parameters
                .single(params::SCOPE)?
                .map(parse_scopes)
                .unwrap_or_default(),
            state: parameters.single("state")?.map(str::to_owned),
            code_challenge,
            code_challenge_method,
            nonce: parameters.single("nonce")?.map(str::to_owned),
        })
    }
}

/// Where to send the user agent after a successful authorization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRedirect {
    /// Redirect URI carrying `code` and `state`
    pub location: String,
}

/// Authorization requests and `grant_type=authorization_code` exchanges
pub struct AuthorizationCodeGrantProvider {
    services: GrantServices,
    clients: Arc<dyn RegisteredClientRepository>,
}

impl AuthorizationCodeGrantProvider {
    /// Create the provider
    #[must_use]
    pub fn new(services: GrantServices, clients: Arc<dyn RegisteredClientRepository>) -> Self {
        Self { services, clients }
    }

    /// Accept an authorization request for an authenticated resource owner
    ///
    /// Consent is implied by the owner's authentication. The authorization
    /// is stored holding a server-generated state and the issued code.
    ///
    /// # Errors
    ///
    /// `invalid_request` for an unknown client, unregistered redirect URI or
    /// missing PKCE challenge; `unauthorized_client` and `invalid_scope` as
    /// for the other grants; `server_error` on generation or storage failure
    pub async fn authorize(
        &self,
        request: AuthorizationRequest,
        principal: &AuthenticatedPrincipal,
    ) -> Result<AuthorizationRedirect, OAuth2Error> {
        let client = self
            .clients
            .find_by_client_id(&request.client_id)
            .await?
            .ok_or_else(|| OAuth2Error::invalid_request("OAuth 2.0 Parameter: client_id"))?;

        let grant_type = AuthorizationGrantType::AuthorizationCode;
        ensure_grant_allowed(&client, &grant_type)?;
        let redirect_uri = resolve_redirect_uri(&client, request.redirect_uri.as_deref())?;

        let authorized_scopes = negotiate_scopes(
            Some(request.scopes.clone()), // Safe: request is stored unchanged below
            &client.scopes,
            BTreeSet::new(),
        )?;

        if request.code_challenge.is_none()
            && (client.client_settings.require_proof_key || client.is_public())
        {
            debug!(client_id = %client.client_id, "Authorization request without required PKCE challenge");
            return Err(OAuth2Error::invalid_request(
                "OAuth 2.0 Parameter: code_challenge",
            ));
        }

        let mut authorization = Authorization::new(&client, principal.name.as_str(), grant_type.clone()) // Safe: aggregate owns its grant type
            .with_authorized_scopes(authorized_scopes.clone()) // Safe: aggregate owns its scopes
            .with_principal(principal)?
            .with_attribute(
                AUTHORIZATION_REQUEST_ATTRIBUTE,
                serde_json::to_value(&request).map_err(AppError::from)?,
            )
            // Client state stays in the request; the indexed slot must be unique
            .with_attribute(STATE_ATTRIBUTE, Value::from(random_code()));

        let context = TokenContext {
            registered_client: &client,
            principal,
            authorization: None,
            authorized_scopes: &authorized_scopes,
            grant_type: &grant_type,
            token_type: TokenSlot::AuthorizationCode,
            issuer: self.services.issuer.as_deref(),
        };
        let code = self.services.token_generator.generate(&context).await?;
        let location = redirect_location(&redirect_uri, &code.value, request.state.as_deref())?;
        authorization.put_token(TokenSlot::AuthorizationCode, code);

        self.services.authorizations.save(&authorization).await?;
        debug!(client_id = %client.client_id, authorization_id = %authorization.id, "Issued authorization code");
        Ok(AuthorizationRedirect { location })
    }

    /// Exchange an authorization code for tokens
    ///
    /// # Errors
    ///
    /// `invalid_grant` for an unknown, foreign, replayed or expired code, a
    /// mismatched redirect URI or a failed PKCE verification
    pub async fn grant(
        &self,
        client: &RegisteredClient,
        parameters: &RequestParameters,
    ) -> Result<AccessTokenResult, OAuth2Error> {
        let grant_type = AuthorizationGrantType::AuthorizationCode;
        ensure_grant_allowed(client, &grant_type)?;

        let code = parameters.required(params::CODE)?;
        let redirect_uri = parameters.single(params::REDIRECT_URI)?;
        let code_verifier = parameters.single(params::CODE_VERIFIER)?;

        let Some(mut authorization) = self
            .services
            .authorizations
            .find_by_token(code, Some(OAuth2TokenType::AUTHORIZATION_CODE))
            .await?
        else {
            return Err(OAuth2Error::invalid_grant("Unknown authorization code"));
        };

        if authorization.registered_client_id != client.id {
            warn!(client_id = %client.client_id, "Authorization code presented by a different client");
            return Err(OAuth2Error::invalid_grant("Authorization code was issued to another client"));
        }

        let request: AuthorizationRequest = authorization
            .attributes
            .get(AUTHORIZATION_REQUEST_ATTRIBUTE)
            .cloned() // Safe: from_value consumes its input
            .map(serde_json::from_value)
            .transpose()
            .map_err(AppError::from)?
            .ok_or_else(|| OAuth2Error::server_error("Authorization request is missing"))?;

        let Some(code_token) = authorization.token(TokenSlot::AuthorizationCode) else {
            return Err(OAuth2Error::invalid_grant("Unknown authorization code"));
        };
        let (code_invalidated, code_active) = (code_token.is_invalidated(), code_token.is_active());

        if code_invalidated {
            warn!(
                client_id = %client.client_id,
                authorization_id = %authorization.id,
                "Authorization code replayed, revoking issued tokens"
            );
            authorization.invalidate(TokenSlot::AccessToken);
            authorization.invalidate(TokenSlot::RefreshToken);
            self.services.authorizations.save(&authorization).await?;
            return Err(OAuth2Error::invalid_grant("Authorization code has already been used"));
        }

        if request.redirect_uri.is_some() && request.redirect_uri.as_deref() != redirect_uri {
            return Err(OAuth2Error::invalid_grant("redirect_uri does not match the authorization request"));
        }
        if !code_active {
            return Err(OAuth2Error::invalid_grant("Authorization code has expired"));
        }
        verify_pkce(&request, code_verifier)?;

        let principal = authorization
            .principal()?
            .ok_or_else(|| OAuth2Error::server_error("Authorization principal is missing"))?;
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
        authorization.invalidate(TokenSlot::AuthorizationCode);

        self.services.authorizations.save(&authorization).await?;
        debug!(client_id = %client.client_id, authorization_id = %authorization.id, "Exchanged authorization code");
        Ok(result)
    }
}

/// The registered redirect URI to use for a request
fn resolve_redirect_uri(
    client: &RegisteredClient,
    requested: Option<&str>,
) -> Result<String, OAuth2Error> {
    match requested {
        Some(uri) if client.redirect_uris.contains(uri) => Ok(uri.to_owned()),
        Some(_) => Err(OAuth2Error::invalid_request("OAuth 2.0 Parameter: redirect_uri")),
        None if client.redirect_uris.len() == 1 => client
            .redirect_uris
            .first()
            .cloned()
            .ok_or_else(|| OAuth2Error::invalid_request("OAuth 2.0 Parameter: redirect_uri")),
        None => Err(OAuth2Error::invalid_request("OAuth 2.0 Parameter: redirect_uri")),
    }
}

fn redirect_location(
    redirect_uri: &str,
    code: &str,
    state: Option<&str>,
) -> Result<String, OAuth2Error> {
    let mut url = Url::parse(redirect_uri)
        .map_err(|_| OAuth2Error::invalid_request("OAuth 2.0 Parameter: redirect_uri"))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair(params::CODE, code);
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(url.into())
}

fn verify_pkce(
    request: &AuthorizationRequest,
    code_verifier: Option<&str>,
) -> Result<(), OAuth2Error> {
    match (&request.code_challenge, code_verifier) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(OAuth2Error::invalid_grant("code_verifier without a code_challenge")),
        (Some(_), None) => Err(OAuth2Error::invalid_grant("code_verifier is required")),
        (Some(challenge), Some(verifier)) => {
            let method = request
                .code_challenge_method
                .unwrap_or(CodeChallengeMethod::Plain);
            if method.verify(verifier, challenge) {
                Ok(())
            } else {
                Err(OAuth2Error::invalid_grant("PKCE verification failed"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s256_matches_rfc7636_example() {
        // RFC 7636 appendix B
        assert!(CodeChallengeMethod::S256.verify(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        ));
        assert!(!CodeChallengeMethod::S256.verify("wrong", "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"));
        assert!(CodeChallengeMethod::Plain.verify("abc", "abc"));
    }

    #[test]
    fn test_request_conversion() {
        let parameters = RequestParameters::parse(
            b"response_type=code&client_id=democlient&scope=openid%20read&state=xyz&code_challenge=abc",
        );
        let request = AuthorizationRequest::from_parameters(&parameters).unwrap();
        assert_eq!(request.client_id, "democlient");
        assert_eq!(request.state.as_deref(), Some("xyz"));
        assert_eq!(request.code_challenge_method, Some(CodeChallengeMethod::Plain));
        assert_eq!(request.scopes.len(), 2);

        let token = RequestParameters::parse(b"response_type=token&client_id=democlient");
        assert_eq!(
            AuthorizationRequest::from_parameters(&token).unwrap_err().error,
            "unsupported_response_type"
        );
    }

    #[test]
    fn test_redirect_resolution() {
        let mut client = RegisteredClient::new("democlient");
        client.redirect_uris = ["https://app.example.com/cb".to_owned()].into();
        assert_eq!(
            resolve_redirect_uri(&client, None).unwrap(),
            "https://app.example.com/cb"
        );
        assert!(resolve_redirect_uri(&client, Some("https://evil.example.com/cb")).is_err());

        let location = redirect_location("https://app.example.com/cb", "c0de", Some("s t")).unwrap();
        assert_eq!(location, "https://app.example.com/cb?code=c0de&state=s+t");
    }
}
