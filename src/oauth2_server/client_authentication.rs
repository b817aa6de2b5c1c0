// ABOUTME: Client authentication at the token, device, introspection and revocation endpoints
// ABOUTME: Supports client_secret_basic, client_secret_post and none (PKCE or device flow only)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use tracing::{debug, warn};

use super::models::OAuth2Error;
use super::parameters::RequestParameters;
use super::password_encoder;
use super::registered_client::RegisteredClient;
use super::store::RegisteredClientRepository;
use super::types::ClientAuthenticationMethod;
use crate::constants::oauth2::params;

/// Credentials extracted from a request before the client is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
struct ClientCredentials {
    client_id: String,
    client_secret: Option<String>,
    method: ClientAuthenticationMethod,
}

/// Authenticates OAuth2 clients against the registered client store
#[derive(Clone)]
pub struct ClientAuthenticator {
    clients: Arc<dyn RegisteredClientRepository>,
}

impl ClientAuthenticator {
    /// Create an authenticator over a client store
    #[must_use]
    pub fn new(clients: Arc<dyn RegisteredClientRepository>) -> Self {
        Self { clients }
    }

    /// Authenticate the client presenting a request
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` for missing, malformed or wrong credentials,
    /// an authentication method the client is not registered for, or an
    /// expired secret
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        parameters: &RequestParameters,
    ) -> Result<RegisteredClient, OAuth2Error> {
        let public_allowed =
            parameters.has(params::CODE_VERIFIER) || parameters.has(params::DEVICE_CODE);
        self.authenticate_with(headers, parameters, public_allowed)
            .await
    }

    /// Authenticate the client starting a device flow
    ///
    /// Public clients are accepted here without further proof.
    ///
    /// # Errors
    ///
    /// Same as [`ClientAuthenticator::authenticate`]
    pub async fn authenticate_device_client(
        &self,
        headers: &HeaderMap,
        parameters: &RequestParameters,
    ) -> Result<RegisteredClient, OAuth2Error> {
        self.authenticate_with(headers, parameters, true).await
    }

    async fn authenticate_with(
        &self,
        headers: &HeaderMap,
        parameters: &RequestParameters,
        public_allowed: bool,
    ) -> Result<RegisteredClient, OAuth2Error> {
        let credentials = extract_credentials(headers, parameters)?;

        let Some(client) = self.clients.find_by_client_id(&credentials.client_id).await? else {
            warn!(client_id = %credentials.client_id, "Client authentication failed: unknown client");
            return Err(OAuth2Error::invalid_client());
        };

        if !client.allows_authentication_method(&credentials.method) {
            warn!(
                client_id = %client.client_id,
                method = %credentials.method,
                "Client authentication failed: method not registered"
            );
            return Err(OAuth2Error::invalid_client());
        }

        match credentials.client_secret {
            Some(secret) => Self::verify_secret(&client, secret).await?,
            None => {
                // Public clients only at endpoints bound to PKCE or the device flow
                if !public_allowed {
                    warn!(
                        client_id = %client.client_id,
                        "Client authentication failed: public client without code_verifier or device_code"
                    );
                    return Err(OAuth2Error::invalid_client());
                }
            }
        }

        debug!(client_id = %client.client_id, method = %credentials.method, "Client authenticated");
        Ok(client)
    }

    async fn verify_secret(client: &RegisteredClient, secret: String) -> Result<(), OAuth2Error> {
        let Some(encoded) = client.client_secret.clone() else {
            warn!(client_id = %client.client_id, "Client authentication failed: no secret registered");
            return Err(OAuth2Error::invalid_client());
        };

        let matches =
            tokio::task::spawn_blocking(move || password_encoder::matches(&secret, &encoded))
                .await
                .unwrap_or(false);
        if !matches {
            warn!(client_id = %client.client_id, "Client authentication failed: invalid secret");
            return Err(OAuth2Error::invalid_client());
        }

        if client
            .client_secret_expires_at
            .is_some_and(|expires_at| expires_at <= Utc::now())
        {
            warn!(client_id = %client.client_id, "Client authentication failed: secret expired");
            return Err(OAuth2Error::invalid_client());
        }
        Ok(())
    }
}

fn extract_credentials(
    headers: &HeaderMap,
    parameters: &RequestParameters,
) -> Result<ClientCredentials, OAuth2Error> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value.to_str().map_err(|_| OAuth2Error::invalid_client())?;
        if let Some(encoded) = value.strip_prefix("Basic ") {
            return parse_basic(encoded.trim());
        }
    }

    let client_id = parameters
        .single(params::CLIENT_ID)
        .map_err(|_| OAuth2Error::invalid_client())?
        .ok_or_else(OAuth2Error::invalid_client)?;
    let client_secret = parameters
        .single(params::CLIENT_SECRET)
        .map_err(|_| OAuth2Error::invalid_client())?;

    Ok(match client_secret {
        Some(secret) => ClientCredentials {
            client_id: client_id.to_owned(),
            client_secret: Some(secret.to_owned()),
            method: ClientAuthenticationMethod::ClientSecretPost,
        },
        None => ClientCredentials {
            client_id: client_id.to_owned(),
            client_secret: None,
            method: ClientAuthenticationMethod::None,
        },
    })
}

/// Decode `base64(urlencode(id):urlencode(secret))` (RFC 6749 section 2.3.1)
fn parse_basic(encoded: &str) -> Result<ClientCredentials, OAuth2Error> {
    let decoded = STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(OAuth2Error::invalid_client)?;
    let (id, secret) = decoded
        .split_once(':')
        .ok_or_else(OAuth2Error::invalid_client)?;

    let client_id = urlencoding::decode(id).map_err(|_| OAuth2Error::invalid_client())?;
    let client_secret = urlencoding::decode(secret).map_err(|_| OAuth2Error::invalid_client())?;
    if client_id.is_empty() || client_secret.is_empty() {
        return Err(OAuth2Error::invalid_client());
    }

    Ok(ClientCredentials {
        client_id: client_id.into_owned(),
        client_secret: Some(client_secret.into_owned()),
        method: ClientAuthenticationMethod::ClientSecretBasic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic(id: &str, secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[test]
    fn test_basic_credentials_are_url_decoded() {
        let credentials =
            extract_credentials(&basic("demo%20client", "s%3Acret"), &RequestParameters::default())
                .unwrap();
        assert_eq!(credentials.client_id, "demo client");
        assert_eq!(credentials.client_secret.as_deref(), Some("s:cret"));
        assert_eq!(credentials.method, ClientAuthenticationMethod::ClientSecretBasic);
    }

    #[test]
    fn test_post_and_public_credentials() {
        let post = RequestParameters::parse(b"client_id=democlient&client_secret=demosecret");
        assert_eq!(
            extract_credentials(&HeaderMap::new(), &post).unwrap().method,
            ClientAuthenticationMethod::ClientSecretPost
        );

        let public = RequestParameters::parse(b"client_id=spa&code_verifier=abc");
        assert_eq!(
            extract_credentials(&HeaderMap::new(), &public).unwrap().method,
            ClientAuthenticationMethod::None
        );
    }

    #[test]
    fn test_missing_or_malformed_credentials() {
        assert!(extract_credentials(&HeaderMap::new(), &RequestParameters::default()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        let error = extract_credentials(&headers, &RequestParameters::default()).unwrap_err();
        assert_eq!(error.error, "invalid_client");
    }
}
