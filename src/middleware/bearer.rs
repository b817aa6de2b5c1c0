// ABOUTME: Bearer token authentication for resource routes
// ABOUTME: Introspects the presented token and exposes the principal as a request extension
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::oauth2_server::principal::AuthenticatedPrincipal;
use crate::server::ServerResources;

/// Principal resolved from the request's bearer token
#[derive(Debug, Clone)]
pub struct BearerPrincipal {
    /// Presented access token
    pub token: String,
    /// Principal behind the token
    pub principal: AuthenticatedPrincipal,
}

impl BearerPrincipal {
    /// The principal, if it is a resource owner
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for tokens issued to a client on its own behalf
    pub fn require_user(&self) -> AppResult<&AuthenticatedPrincipal> {
        if self.principal.is_user() {
            Ok(&self.principal)
        } else {
            Err(AppError::permission_denied(
                "Token does not represent a user",
            ))
        }
    }
}

/// Extract the token from an `Authorization: Bearer` header
///
/// # Errors
///
/// `AuthInvalid` for a non-bearer scheme or an empty token
pub fn bearer_token(headers: &HeaderMap) -> AppResult<Option<&str>> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::auth_invalid("Malformed authorization header"))?;
    let token = match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("Bearer") => token.trim(),
        _ => {
            return Err(AppError::auth_invalid(
                "Authorization header is not a bearer token",
            ))
        }
    };
    if token.is_empty() {
        return Err(AppError::auth_invalid("Empty bearer token"));
    }
    Ok(Some(token))
}

/// Middleware authenticating every request outside the ignored URL patterns
///
/// # Errors
///
/// `AuthRequired` without a token, `AuthInvalid` for an unusable one
pub async fn require_bearer(
    State(resources): State<Arc<ServerResources>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if resources.url_ignore.is_ignored(request.uri().path()) {
        debug!(path = %request.uri().path(), "Bearer authentication skipped for ignored URL");
        return Ok(next.run(request).await);
    }

    let token = bearer_token(request.headers())?
        .ok_or_else(|| {
            warn!(path = %request.uri().path(), "Authentication failed: missing bearer token");
            AppError::auth_required()
        })?
        .to_owned();
    let principal = resources.introspector.introspect(&token).await?;
    debug!(principal = %principal.name, "Bearer token authenticated");

    request
        .extensions_mut()
        .insert(BearerPrincipal { token, principal });
    Ok(next.run(request).await)
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for BearerPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(AppError::auth_required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&HeaderMap::new()).unwrap(), None);
        assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer abc")).unwrap(), Some("abc"));
        assert_eq!(bearer_token(&headers("BEARER abc")).unwrap(), Some("abc"));
        assert!(bearer_token(&headers("Basic abc")).is_err());
        assert!(bearer_token(&headers("Bearer  ")).is_err());
        assert!(bearer_token(&headers("Bearerabc")).is_err());
    }

    #[test]
    fn test_client_principal_is_not_a_user() {
        let bearer = BearerPrincipal {
            token: "t".to_owned(),
            principal: AuthenticatedPrincipal::client("democlient"),
        };
        let error = bearer.require_user().unwrap_err();
        assert_eq!(error.http_status(), 403);
    }
}
