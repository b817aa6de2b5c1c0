// ABOUTME: OAuth 2.0 protocol endpoints: token, authorize, device flow, introspection, revocation, JWKS
// ABOUTME: Thin axum handlers parsing form parameters and delegating to the oauth2_server providers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! OAuth 2.0 server routes
//!
//! Every endpoint takes form-encoded parameters (the authorize endpoint also
//! accepts them in the query string, but never the owner's password) and
//! answers with JSON. Protocol errors use the RFC 6749 error body.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::json;
use tracing::{debug, info};

use crate::constants::oauth2::params;
use crate::errors::AppError;
use crate::oauth2_server::grants::authorization_code::AuthorizationRequest;
use crate::oauth2_server::models::OAuth2Error;
use crate::oauth2_server::parameters::RequestParameters;
use crate::oauth2_server::principal::AuthenticatedPrincipal;
use crate::server::ServerResources;

/// OAuth 2.0 routes implementation
pub struct OAuth2Routes;

impl OAuth2Routes {
    /// Create all OAuth 2.0 routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/oauth2/token", post(Self::handle_token))
            .route(
                "/oauth2/authorize",
                get(Self::handle_authorize_get).post(Self::handle_authorize_post),
            )
            .route(
                "/oauth2/device_authorization",
                post(Self::handle_device_authorization),
            )
            .route(
                "/oauth2/device_verification",
                post(Self::handle_device_verification),
            )
            .route("/oauth2/introspect", post(Self::handle_introspect))
            .route("/oauth2/revoke", post(Self::handle_revoke))
            .route("/oauth2/jwks", get(Self::handle_jwks))
            .route("/.well-known/jwks.json", get(Self::handle_jwks))
            .with_state(resources)
    }

    /// Handle token requests (RFC 6749 section 3.2)
    async fn handle_token(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let parameters = RequestParameters::parse(&body);
        match resources.token_endpoint.handle(&headers, &parameters).await {
            Ok(response) => response.into_response(),
            Err(error) => error.into_response(),
        }
    }

    async fn handle_authorize_get(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        RawQuery(query): RawQuery,
    ) -> Result<Response, OAuth2Error> {
        let parameters = RequestParameters::parse(query.unwrap_or_default().as_bytes());
        // Owner credentials are never read from the query string
        Self::authorize(&resources, &headers, &parameters, None).await
    }

    async fn handle_authorize_post(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, OAuth2Error> {
        let parameters = RequestParameters::parse(&body);
        Self::authorize(&resources, &headers, &parameters, Some(&parameters)).await
    }

    /// Authenticate the resource owner and redirect back with a code
    async fn authorize(
        resources: &ServerResources,
        headers: &HeaderMap,
        parameters: &RequestParameters,
        owner_form: Option<&RequestParameters>,
    ) -> Result<Response, OAuth2Error> {
        let request = AuthorizationRequest::from_parameters(parameters)?;
        let principal = Self::authenticate_owner(resources, headers, owner_form).await?;
        let redirect = resources
            .authorization_code
            .authorize(request, &principal)
            .await?;
        Ok((StatusCode::FOUND, [(header::LOCATION, redirect.location)]).into_response())
    }

    /// Handle device authorization requests (RFC 8628 section 3.1)
    async fn handle_device_authorization(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, OAuth2Error> {
        let parameters = RequestParameters::parse(&body);
        let client = resources
            .client_authenticator
            .authenticate_device_client(&headers, &parameters)
            .await?;
        let response = resources
            .device_code
            .authorize_device(&client, &parameters)
            .await?;
        Ok(no_store(Json(response).into_response()))
    }

    /// Record the resource owner's decision for a user code
    async fn handle_device_verification(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Json<serde_json::Value>, OAuth2Error> {
        let parameters = RequestParameters::parse(&body);
        let user_code = parameters.required("user_code")?;
        // Submitting credentials approves unless the owner explicitly declines
        let approve = !matches!(
            parameters.single("approve")?,
            Some(value) if value.eq_ignore_ascii_case("false")
        );

        let principal = Self::authenticate_owner(&resources, &headers, Some(&parameters)).await?;
        resources
            .device_code
            .verify_user_code(user_code, &principal, approve)
            .await?;

        Ok(Json(json!({
            "status": if approve { "approved" } else { "denied" },
        })))
    }

    /// Handle token introspection (RFC 7662)
    async fn handle_introspect(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, OAuth2Error> {
        let parameters = RequestParameters::parse(&body);
        let client = resources
            .client_authenticator
            .authenticate(&headers, &parameters)
            .await?;
        let token = parameters.required(params::TOKEN)?;
        let hint = parameters.single(params::TOKEN_TYPE_HINT)?;

        let response = resources
            .introspector
            .introspection_response(&client, token, hint)
            .await?;
        debug!(client_id = %client.client_id, active = response.active, "Token introspected");
        Ok(no_store(Json(response).into_response()))
    }

    /// Handle token revocation (RFC 7009)
    async fn handle_revoke(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<StatusCode, OAuth2Error> {
        let parameters = RequestParameters::parse(&body);
        let client = resources
            .client_authenticator
            .authenticate(&headers, &parameters)
            .await?;
        let token = parameters.required(params::TOKEN)?;
        let hint = parameters.single(params::TOKEN_TYPE_HINT)?;

        resources.revocation.revoke(&client, token, hint).await?;
        Ok(StatusCode::OK)
    }

    /// Publish the public signing keys
    async fn handle_jwks(
        State(resources): State<Arc<ServerResources>>,
    ) -> Result<Response, AppError> {
        let key_set = resources.key_manager.signing_key_set().await?;
        let mut response = Json(key_set.jwk_set()).into_response();
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=3600"),
        );
        Ok(response)
    }

    /// Resource owner credentials from HTTP Basic or the `username`/`password` body fields
    async fn authenticate_owner(
        resources: &ServerResources,
        headers: &HeaderMap,
        form: Option<&RequestParameters>,
    ) -> Result<AuthenticatedPrincipal, OAuth2Error> {
        let (username, password) = match basic_credentials(headers) {
            Some(credentials) => credentials,
            None => match form.map(|f| (f.first("username"), f.first("password"))) {
                Some((Some(username), Some(password))) => {
                    (username.to_owned(), password.to_owned())
                }
                _ => {
                    return Err(OAuth2Error::invalid_request(
                        "Resource owner authentication is required",
                    ))
                }
            },
        };

        let principal = resources
            .authentication_manager
            .authenticate(&username, &password)
            .await?;
        info!(username = %principal.name, "Resource owner authenticated");
        Ok(principal)
    }
}

/// `user:password` from an `Authorization: Basic` header
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_owned(), password.to_owned()))
}

fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
