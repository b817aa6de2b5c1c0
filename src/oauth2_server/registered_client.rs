// ABOUTME: Registered OAuth2 client model with client and token settings
// ABOUTME: Holds allowed grant types, auth methods, scopes, redirect URIs and token lifetimes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::types::{
    AuthorizationGrantType, ClientAuthenticationMethod, SignatureAlgorithm, TokenFormat,
};

/// Per-client behaviour settings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientSettings {
    /// Authorization code flow requires a PKCE challenge
    pub require_proof_key: bool,
    /// Authorization requests require explicit user consent
    pub require_authorization_consent: bool,
    /// JWK set URL for `private_key_jwt` client authentication
    pub jwk_set_url: Option<String>,
    /// Algorithm for JWT-based client authentication
    pub token_endpoint_authentication_signing_algorithm: Option<SignatureAlgorithm>,
    /// Expected subject DN for `tls_client_auth`
    pub x509_certificate_subject_dn: Option<String>,
}

/// Per-client token lifetimes and formats
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSettings {
    /// Authorization code lifetime
    pub authorization_code_time_to_live: Duration,
    /// Access token lifetime
    pub access_token_time_to_live: Duration,
    /// Access token format
    pub access_token_format: TokenFormat,
    /// Device code lifetime
    pub device_code_time_to_live: Duration,
    /// User code lifetime
    pub user_code_time_to_live: Duration,
    /// Keep the same refresh token on refresh instead of rotating it
    pub reuse_refresh_tokens: bool,
    /// Refresh token lifetime
    pub refresh_token_time_to_live: Duration,
    /// ID token signature algorithm
    pub id_token_signature_algorithm: SignatureAlgorithm,
    /// Bind access tokens to the client certificate
    pub x509_certificate_bound_access_tokens: bool,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            authorization_code_time_to_live: Duration::minutes(5),
            access_token_time_to_live: Duration::minutes(5),
            access_token_format: TokenFormat::SelfContained,
            device_code_time_to_live: Duration::minutes(5),
            user_code_time_to_live: Duration::minutes(5),
            reuse_refresh_tokens: true,
            refresh_token_time_to_live: Duration::minutes(60),
            id_token_signature_algorithm: SignatureAlgorithm::RS256,
            x509_certificate_bound_access_tokens: false,
        }
    }
}

/// A registered OAuth2 client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredClient {
    /// Internal identifier
    pub id: String,
    /// Public client identifier
    pub client_id: String,
    /// When the client id was issued
    pub client_id_issued_at: Option<DateTime<Utc>>,
    /// Hashed client secret (`None` for public clients)
    pub client_secret: Option<String>,
    /// When the client secret stops being accepted
    pub client_secret_expires_at: Option<DateTime<Utc>>,
    /// Display name
    pub client_name: String,
    /// Allowed client authentication methods
    pub client_authentication_methods: BTreeSet<ClientAuthenticationMethod>,
    /// Allowed grant types
    pub authorization_grant_types: BTreeSet<AuthorizationGrantType>,
    /// Registered redirect URIs
    pub redirect_uris: BTreeSet<String>,
    /// Registered post-logout redirect URIs
    pub post_logout_redirect_uris: BTreeSet<String>,
    /// Scopes the client may request
    pub scopes: BTreeSet<String>,
    /// Client settings
    pub client_settings: ClientSettings,
    /// Token settings
    pub token_settings: TokenSettings,
}

impl RegisteredClient {
    /// Create a client with a fresh internal id and default settings
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        Self {
            id: Uuid::new_v4().to_string(),
            client_name: client_id.clone(), // Safe: display name defaults to the client id
            client_id,
            client_id_issued_at: Some(Utc::now()),
            client_secret: None,
            client_secret_expires_at: None,
            client_authentication_methods: BTreeSet::new(),
            authorization_grant_types: BTreeSet::new(),
            redirect_uris: BTreeSet::new(),
            post_logout_redirect_uris: BTreeSet::new(),
            scopes: BTreeSet::new(),
            client_settings: ClientSettings::default(),
            token_settings: TokenSettings::default(),
        }
    }

    /// Whether the client may use the given grant type
    #[must_use]
    pub fn allows_grant_type(&self, grant_type: &AuthorizationGrantType) -> bool {
        self.authorization_grant_types.contains(grant_type)
    }

    /// Whether the client may authenticate with the given method
    #[must_use]
    pub fn allows_authentication_method(&self, method: &ClientAuthenticationMethod) -> bool {
        self.client_authentication_methods.contains(method)
    }

    /// Public clients authenticate with `none` only
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.client_authentication_methods.len() == 1
            && self.allows_authentication_method(&ClientAuthenticationMethod::None)
    }

    /// Whether every requested scope is registered for this client
    #[must_use]
    pub fn allows_scopes(&self, requested: &BTreeSet<String>) -> bool {
        requested.is_subset(&self.scopes)
    }
}
