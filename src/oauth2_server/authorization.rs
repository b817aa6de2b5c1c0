// ABOUTME: Authorization aggregate: one record per OAuth2 grant with independent token slots
// ABOUTME: Each slot carries its value, issue and expiry instants, and a metadata map
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Authorization aggregate
//!
//! An [`Authorization`] records a single grant: the client, the principal,
//! the authorized scopes, an attribute bag and up to six token slots
//! (authorization code, access, refresh, ID, user code, device code). The
//! `state` of an authorization request lives in the attribute bag and is
//! looked up like a seventh slot.
//!
//! The aggregate serializes in full, so a stored record can always be turned
//! back into the principal that was authenticated when it was issued.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::principal::AuthenticatedPrincipal;
use super::registered_client::RegisteredClient;
use super::types::{AuthorizationGrantType, OAuth2TokenType, TokenSlot};
use crate::constants::oauth2::{
    CLAIMS_METADATA_KEY, INVALIDATED_METADATA_KEY, PRINCIPAL_ATTRIBUTE, STATE_ATTRIBUTE,
};
use crate::errors::AppResult;

/// A token held in one slot of an [`Authorization`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Token {
    /// Token value (opaque string or compact JWS)
    pub value: String,
    /// Issue instant
    pub issued_at: Option<DateTime<Utc>>,
    /// Expiry instant
    pub expires_at: Option<DateTime<Utc>>,
    /// Implementation-defined metadata (claims, invalidation flag)
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Scopes carried by an access token
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub scopes: BTreeSet<String>,
    /// Token type of an access token (`Bearer`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl OAuth2Token {
    /// Create a token with empty metadata
    pub fn new(
        value: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            value: value.into(),
            issued_at: Some(issued_at),
            expires_at,
            metadata: Map::new(),
            scopes: BTreeSet::new(),
            token_type: None,
        }
    }

    /// Attach the claims carried by this token
    #[must_use]
    pub fn with_claims(mut self, claims: Map<String, Value>) -> Self {
        self.metadata
            .insert(CLAIMS_METADATA_KEY.to_owned(), Value::Object(claims));
        self
    }

    /// Claims recorded for this token
    #[must_use]
    pub fn claims(&self) -> Option<&Map<String, Value>> {
        self.metadata
            .get(CLAIMS_METADATA_KEY)
            .and_then(Value::as_object)
    }

    /// Whether the token has passed its expiry instant
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Whether the token was explicitly invalidated
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.metadata
            .get(INVALIDATED_METADATA_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Neither expired nor invalidated
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_invalidated() && !self.is_expired_at(Utc::now())
    }

    /// Mark the token as invalidated
    pub fn invalidate(&mut self) {
        self.metadata
            .insert(INVALIDATED_METADATA_KEY.to_owned(), Value::Bool(true));
    }

    /// Seconds between issue and expiry, clamped at zero
    #[must_use]
    pub fn expires_in(&self) -> i64 {
        match (self.issued_at, self.expires_at) {
            (Some(issued_at), Some(expires_at)) => (expires_at - issued_at).num_seconds().max(0),
            _ => 0,
        }
    }
}

/// One OAuth2 grant instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    /// Opaque identifier
    pub id: String,
    /// Internal id of the registered client
    pub registered_client_id: String,
    /// Name of the resource owner (or client for `client_credentials`)
    pub principal_name: String,
    /// Grant type that created this authorization
    pub authorization_grant_type: AuthorizationGrantType,
    /// Scopes authorized for this grant
    #[serde(default)]
    pub authorized_scopes: BTreeSet<String>,
    /// Attribute bag (principal, state, original request, extra parameters)
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Populated token slots
    #[serde(default)]
    pub tokens: BTreeMap<TokenSlot, OAuth2Token>,
}

impl Authorization {
    /// Start a new authorization for a client and principal
    pub fn new(
        registered_client: &RegisteredClient,
        principal_name: impl Into<String>,
        grant_type: AuthorizationGrantType,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            registered_client_id: registered_client.id.clone(), // Safe: aggregate owns a copy of the reference
            principal_name: principal_name.into(),
            authorization_grant_type: grant_type,
            authorized_scopes: BTreeSet::new(),
            attributes: Map::new(),
            tokens: BTreeMap::new(),
        }
    }

    /// Set the authorized scopes
    #[must_use]
    pub fn with_authorized_scopes(mut self, scopes: BTreeSet<String>) -> Self {
        self.authorized_scopes = scopes;
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_owned(), value);
        self
    }

    /// Record the authenticated principal
    ///
    /// # Errors
    ///
    /// Returns an error if the principal cannot be serialized
    pub fn with_principal(self, principal: &AuthenticatedPrincipal) -> AppResult<Self> {
        let value = serde_json::to_value(principal)?;
        Ok(self.with_attribute(PRINCIPAL_ATTRIBUTE, value))
    }

    /// Put a token into a slot
    #[must_use]
    pub fn with_token(mut self, slot: TokenSlot, token: OAuth2Token) -> Self {
        self.tokens.insert(slot, token);
        self
    }

    /// Put a token into a slot in place
    pub fn put_token(&mut self, slot: TokenSlot, token: OAuth2Token) {
        self.tokens.insert(slot, token);
    }

    /// Token in a slot
    #[must_use]
    pub fn token(&self, slot: TokenSlot) -> Option<&OAuth2Token> {
        self.tokens.get(&slot)
    }

    /// Access token slot
    #[must_use]
    pub fn access_token(&self) -> Option<&OAuth2Token> {
        self.token(TokenSlot::AccessToken)
    }

    /// Refresh token slot
    #[must_use]
    pub fn refresh_token(&self) -> Option<&OAuth2Token> {
        self.token(TokenSlot::RefreshToken)
    }

    /// `state` of the authorization request
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.attributes.get(STATE_ATTRIBUTE).and_then(Value::as_str)
    }

    /// Value stored under a lookup type
    #[must_use]
    pub fn value_of(&self, token_type: OAuth2TokenType) -> Option<&str> {
        match token_type {
            OAuth2TokenType::State => self.state(),
            OAuth2TokenType::Token(slot) => self.token(slot).map(|token| token.value.as_str()),
        }
    }

    /// Invalidate the token in a slot, if present
    ///
    /// Invalidating the refresh token also invalidates the access token
    /// issued alongside it.
    pub fn invalidate(&mut self, slot: TokenSlot) {
        if let Some(token) = self.tokens.get_mut(&slot) {
            token.invalidate();
        }
        if slot == TokenSlot::RefreshToken {
            if let Some(access_token) = self.tokens.get_mut(&TokenSlot::AccessToken) {
                access_token.invalidate();
            }
        }
    }

    /// Principal recorded when the authorization was created
    ///
    /// # Errors
    ///
    /// Returns an error if the stored principal is malformed
    pub fn principal(&self) -> AppResult<Option<AuthenticatedPrincipal>> {
        self.attributes
            .get(PRINCIPAL_ATTRIBUTE)
            .map(|value| serde_json::from_value(value.clone())) // Safe: from_value consumes its input
            .transpose()
            .map_err(Into::into)
    }
}
