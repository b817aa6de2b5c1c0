// ABOUTME: Bearer-protected resource routes for token holders
// ABOUTME: Token info returns the introspected principal; logout revokes the presented token
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::errors::AppResult;
use crate::middleware::{require_bearer, BearerPrincipal};
use crate::server::ServerResources;

/// Principal view returned by `GET /token/info`
#[derive(Debug, Serialize)]
pub struct TokenInfoResponse {
    /// Principal name
    pub name: String,
    /// Granted authorities
    pub authorities: Vec<String>,
    /// Stored principal attributes merged with the token claims
    pub attributes: Map<String, Value>,
}

/// Token holder routes implementation
pub struct TokenRoutes;

impl TokenRoutes {
    /// Create the bearer-protected token routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/token/info", get(Self::handle_info))
            .route("/token/logout", delete(Self::handle_logout))
            .route_layer(from_fn_with_state(resources.clone(), require_bearer))
            .with_state(resources)
    }

    async fn handle_info(bearer: BearerPrincipal) -> AppResult<Json<TokenInfoResponse>> {
        let principal = bearer.require_user()?;
        Ok(Json(TokenInfoResponse {
            name: principal.name.clone(),
            authorities: principal.authorities.iter().cloned().collect(),
            attributes: principal.attributes.clone(),
        }))
    }

    /// Revoke the presented access token
    async fn handle_logout(
        State(resources): State<Arc<ServerResources>>,
        bearer: BearerPrincipal,
    ) -> AppResult<StatusCode> {
        resources.revocation.logout(&bearer.token).await?;
        info!(principal = %bearer.principal.name, "Logged out");
        Ok(StatusCode::NO_CONTENT)
    }
}
