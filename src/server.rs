// ABOUTME: Shared server resources and the HTTP server lifecycle
// ABOUTME: Wires stores, key manager and grant providers once, then serves the axum router
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Server Resources
//!
// NOTE: `.clone()` calls on `Arc` handles in this file share resources across handlers
//!
//! Centralized resource container for dependency injection. Every handler
//! receives an `Arc<ServerResources>` as router state.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::jwks::SigningKeyManager;
use crate::middleware::{setup_cors, UrlIgnoreCache};
use crate::oauth2_server::authentication::{
    AuthenticationManager, DaoAuthenticationManager, UserDetailsService,
};
use crate::oauth2_server::client_authentication::ClientAuthenticator;
use crate::oauth2_server::grants::{
    AuthorizationCodeGrantProvider, ClientCredentialsGrantProvider, DeviceCodeGrantProvider,
    GrantServices, PasswordGrantProvider, RefreshTokenGrantProvider, TokenEndpoint,
};
use crate::oauth2_server::introspection::{OpaqueTokenIntrospector, TokenRevocationService};
use crate::oauth2_server::store::{AuthorizationService, RegisteredClientRepository};
use crate::oauth2_server::token_generator::DelegatingTokenGenerator;
use crate::routes::{HealthRoutes, OAuth2Routes, TokenRoutes};

/// Centralized resource container for dependency injection
pub struct ServerResources {
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Database handle
    pub database: Database,
    /// Process-wide signing key set
    pub key_manager: Arc<SigningKeyManager>,
    /// Authorization store
    pub authorizations: Arc<dyn AuthorizationService>,
    /// Registered client store
    pub clients: Arc<dyn RegisteredClientRepository>,
    /// Resource owner store
    pub users: Arc<dyn UserDetailsService>,
    /// Client authentication for protocol endpoints
    pub client_authenticator: ClientAuthenticator,
    /// Resource owner authentication
    pub authentication_manager: Arc<dyn AuthenticationManager>,
    /// `POST /oauth2/token` dispatcher
    pub token_endpoint: TokenEndpoint,
    /// Authorization endpoint and code exchange
    pub authorization_code: Arc<AuthorizationCodeGrantProvider>,
    /// Device authorization, verification and polling
    pub device_code: Arc<DeviceCodeGrantProvider>,
    /// Access token introspection
    pub introspector: OpaqueTokenIntrospector,
    /// Logout and RFC 7009 revocation
    pub revocation: TokenRevocationService,
    /// Paths that skip bearer authentication
    pub url_ignore: UrlIgnoreCache,
}

impl ServerResources {
    /// Create resources with a key manager built from the configured PEM locations
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed ignore URL pattern
    pub fn new(config: ServerConfig, database: Database) -> AppResult<Self> {
        let key_manager = Arc::new(SigningKeyManager::from_settings(&config.oauth2));
        Self::with_key_manager(config, database, key_manager)
    }

    /// Create resources around an existing key manager
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed ignore URL pattern
    pub fn with_key_manager(
        config: ServerConfig,
        database: Database,
        key_manager: Arc<SigningKeyManager>,
    ) -> AppResult<Self> {
        let authorizations: Arc<dyn AuthorizationService> = Arc::new(database.authorizations());
        let clients: Arc<dyn RegisteredClientRepository> =
            Arc::new(database.registered_clients());
        let users: Arc<dyn UserDetailsService> = Arc::new(database.users());
        let authentication_manager: Arc<dyn AuthenticationManager> =
            Arc::new(DaoAuthenticationManager::new(users.clone()));
        let client_authenticator = ClientAuthenticator::new(clients.clone());

        let services = GrantServices {
            authorizations: authorizations.clone(),
            token_generator: Arc::new(DelegatingTokenGenerator::with_defaults(
                key_manager.clone(),
            )),
            issuer: config.oauth2.issuer(),
        };
        let authorization_code = Arc::new(AuthorizationCodeGrantProvider::new(
            services.clone(),
            clients.clone(),
        ));
        let device_code = Arc::new(DeviceCodeGrantProvider::new(
            services.clone(),
            config.oauth2.device_verification_uri.as_str(),
        ));
        let token_endpoint = TokenEndpoint::new(
            client_authenticator.clone(),
            PasswordGrantProvider::new(
                services.clone(),
                authentication_manager.clone(),
                config.oauth2.username_parameter_name.as_str(),
                config.oauth2.password_parameter_name.as_str(),
            ),
            ClientCredentialsGrantProvider::new(services.clone()),
            authorization_code.clone(),
            RefreshTokenGrantProvider::new(services),
            device_code.clone(),
        );

        Ok(Self {
            url_ignore: UrlIgnoreCache::new(&config.oauth2.ignore_urls)?,
            introspector: OpaqueTokenIntrospector::new(authorizations.clone(), users.clone()),
            revocation: TokenRevocationService::new(authorizations.clone()),
            config: Arc::new(config),
            database,
            key_manager,
            authorizations,
            clients,
            users,
            client_authenticator,
            authentication_manager,
            token_endpoint,
            authorization_code,
            device_code,
        })
    }
}

/// Build the application router
pub fn router(resources: &Arc<ServerResources>) -> Router {
    Router::new()
        .merge(HealthRoutes::routes(resources.clone()))
        .merge(OAuth2Routes::routes(resources.clone()))
        .merge(TokenRoutes::routes(resources.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(setup_cors(&resources.config))
}

/// Serve HTTP until Ctrl-C
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails
pub async fn serve(resources: Arc<ServerResources>) -> AppResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], resources.config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::internal(format!("Cannot bind {addr}: {e}")))?;
    info!(%addr, "Authorization server listening");

    axum::serve(listener, router(&resources))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("HTTP server failed: {e}")))?;

    info!("Authorization server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
