// ABOUTME: OAuth 2.0 and OpenID Connect authorization server core
// ABOUTME: Grant providers, token generation, client authentication, introspection and revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Resource owner authentication
pub mod authentication;
/// Authorization aggregate and token slots
pub mod authorization;
/// Client authentication at protocol endpoints
pub mod client_authentication;
/// Token lifetime parsing and formatting
pub mod durations;
/// Grant providers and the token endpoint
pub mod grants;
/// Access token introspection and revocation
pub mod introspection;
/// Protocol request/response bodies and the protocol error type
pub mod models;
/// Form-encoded request parameters
pub mod parameters;
/// Password and client secret encoding
pub mod password_encoder;
/// Authenticated principal
pub mod principal;
/// Registered client model
pub mod registered_client;
/// Storage traits
pub mod store;
/// Token generator chain
pub mod token_generator;
/// OAuth2 vocabulary types
pub mod types;

pub use authentication::{AuthenticationManager, DaoAuthenticationManager, UserDetails, UserDetailsService};
pub use authorization::{Authorization, OAuth2Token};
pub use client_authentication::ClientAuthenticator;
pub use grants::{
    AccessTokenResult, AuthorizationCodeGrantProvider, ClientCredentialsGrantProvider,
    DeviceCodeGrantProvider, GrantServices, PasswordGrantProvider, RefreshTokenGrantProvider,
    TokenEndpoint,
};
pub use introspection::{OpaqueTokenIntrospector, TokenRevocationService};
pub use models::{DeviceAuthorizationResponse, IntrospectionResponse, OAuth2Error, TokenResponse};
pub use principal::AuthenticatedPrincipal;
pub use registered_client::{ClientSettings, RegisteredClient, TokenSettings};
pub use store::{AuthorizationService, RegisteredClientRepository};
pub use token_generator::{DelegatingTokenGenerator, OAuth2TokenGenerator, TokenContext};
pub use types::{
    AuthorizationGrantType, ClientAuthenticationMethod, OAuth2TokenType, SignatureAlgorithm,
    TokenFormat, TokenSlot,
};
