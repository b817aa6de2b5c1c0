// ABOUTME: Main library entry point for the OAuth2/OIDC authorization server
// ABOUTME: Issues, stores, introspects and revokes tokens for registered clients
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![recursion_limit = "256"]
#![deny(unsafe_code)]

//! # Authorization Server
//!
//! An OAuth 2.0 / OpenID Connect authorization server.
//!
//! ## Features
//!
//! - **Grants**: password, client credentials, authorization code with PKCE,
//!   refresh token and the device authorization grant
//! - **Token formats**: opaque reference tokens resolved by introspection, or
//!   self-contained JWTs signed with an RSA key published as a JWK set
//! - **OIDC**: ID tokens for requests carrying the `openid` scope
//! - **Storage**: registered clients, users and authorizations in `SQLite`
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use authz_server::config::ServerConfig;
//! use authz_server::database::Database;
//! use authz_server::errors::AppResult;
//! use authz_server::server::{serve, ServerResources};
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     let database = Database::new(&config.database).await?;
//!     let resources = Arc::new(ServerResources::new(config, database)?);
//!     serve(resources).await
//! }
//! ```

/// Environment-based configuration
pub mod config;
/// Application constants
pub mod constants;
/// `SQLite` stores for clients, users and authorizations
pub mod database;
/// Unified error handling
pub mod errors;
/// Signing key management and JWK publication
pub mod jwks;
/// Structured logging setup
pub mod logging;
/// HTTP middleware
pub mod middleware;
/// OAuth 2.0 and OIDC server core
pub mod oauth2_server;
/// HTTP routes
pub mod routes;
/// Server resources and lifecycle
pub mod server;
