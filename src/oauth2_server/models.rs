// ABOUTME: OAuth 2.0 protocol request/response bodies and the protocol error type
// ABOUTME: Token, device authorization and introspection responses per RFC 6749, 8628 and 7662
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::fmt;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::oauth2::error_uris;
use crate::errors::AppError;

/// OAuth 2.0 Token Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token value
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Space-delimited granted scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Refresh token, when one was issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Additional parameters such as `id_token`
    #[serde(flatten)]
    pub additional_parameters: Map<String, Value>,
}

impl IntoResponse for TokenResponse {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::OK, Json(self)).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        response
    }
}

/// RFC 8628 device authorization response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorizationResponse {
    /// Device verification code
    pub device_code: String,
    /// End-user verification code
    pub user_code: String,
    /// End-user verification URI
    pub verification_uri: String,
    /// Verification URI including the user code
    pub verification_uri_complete: String,
    /// Lifetime in seconds of the device and user codes
    pub expires_in: i64,
    /// Minimum polling interval in seconds
    pub interval: i64,
}

/// RFC 7662 introspection response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active
    pub active: bool,
    /// Claims of an active token
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl IntrospectionResponse {
    /// Response for an unknown, inactive or foreign token
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// OAuth 2.0 Error Response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// URI for error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl OAuth2Error {
    fn with_uri(error: &str, description: &str, uri: &str) -> Self {
        Self {
            error: error.to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(uri.to_owned()),
        }
    }

    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self::with_uri("invalid_request", description, error_uris::TOKEN_ENDPOINT)
    }

    /// Create an `invalid_client` error
    #[must_use]
    pub fn invalid_client() -> Self {
        Self::with_uri(
            "invalid_client",
            "Client authentication failed",
            error_uris::TOKEN_ENDPOINT,
        )
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self::with_uri("invalid_grant", description, error_uris::TOKEN_ENDPOINT)
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self::with_uri(
            "unsupported_grant_type",
            "Grant type not supported",
            error_uris::TOKEN_ENDPOINT,
        )
    }

    /// Create an `unsupported_response_type` error
    #[must_use]
    pub fn unsupported_response_type() -> Self {
        Self::with_uri(
            "unsupported_response_type",
            "Only 'code' response_type is supported",
            error_uris::AUTHORIZATION_ENDPOINT,
        )
    }

    /// Create an `unauthorized_client` error
    /// Used when a client attempts to use a `grant_type` it was not registered for
    #[must_use]
    pub fn unauthorized_client(description: &str) -> Self {
        Self::with_uri(
            "unauthorized_client",
            description,
            error_uris::AUTHORIZATION_ENDPOINT,
        )
    }

    /// Create an `invalid_scope` error
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self::with_uri(
            "invalid_scope",
            description,
            error_uris::AUTHORIZATION_ENDPOINT,
        )
    }

    /// Create a `server_error`
    #[must_use]
    pub fn server_error(description: &str) -> Self {
        Self::with_uri("server_error", description, error_uris::TOKEN_ENDPOINT)
    }

    /// Device flow: user has not acted yet
    #[must_use]
    pub fn authorization_pending() -> Self {
        Self::with_uri(
            "authorization_pending",
            "The authorization request is still pending",
            error_uris::DEVICE_TOKEN,
        )
    }

    /// Device flow: client polls faster than the advertised interval
    #[must_use]
    pub fn slow_down() -> Self {
        Self::with_uri(
            "slow_down",
            "Polling too frequently, increase the interval",
            error_uris::DEVICE_TOKEN,
        )
    }

    /// Device flow: user denied the request
    #[must_use]
    pub fn access_denied() -> Self {
        Self::with_uri(
            "access_denied",
            "The authorization request was denied",
            error_uris::DEVICE_TOKEN,
        )
    }

    /// Device flow: device code expired
    #[must_use]
    pub fn expired_token() -> Self {
        Self::with_uri(
            "expired_token",
            "The device code has expired",
            error_uris::DEVICE_TOKEN,
        )
    }

    /// HTTP status for this error at the token endpoint
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "invalid_client" => StatusCode::UNAUTHORIZED,
            "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for OAuth2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {description}", self.error),
            None => f.write_str(&self.error),
        }
    }
}

impl std::error::Error for OAuth2Error {}

impl IntoResponse for OAuth2Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self)).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        if status == StatusCode::UNAUTHORIZED {
            headers.insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"oauth2\""),
            );
        }
        response
    }
}

/// Internal failures surface as a generic `server_error`
impl From<AppError> for OAuth2Error {
    fn from(error: AppError) -> Self {
        tracing::error!(code = ?error.code, error = %error, "Internal failure during OAuth2 request");
        Self::server_error("The authorization server encountered an unexpected condition")
    }
}
