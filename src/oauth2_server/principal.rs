// ABOUTME: Authenticated principal recorded on authorizations and returned by introspection
// ABOUTME: Carries the principal name, granted authorities and an attribute map
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of principal behind a grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// A resource owner
    User,
    /// A client acting on its own behalf
    Client,
}

/// An authenticated principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedPrincipal {
    /// Principal name (username or client id)
    pub name: String,
    /// User or client
    pub kind: PrincipalKind,
    /// Granted authorities
    #[serde(default)]
    pub authorities: BTreeSet<String>,
    /// Additional attributes
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl AuthenticatedPrincipal {
    /// A resource owner principal
    pub fn user(name: impl Into<String>, authorities: BTreeSet<String>) -> Self {
        Self {
            name: name.into(),
            kind: PrincipalKind::User,
            authorities,
            attributes: Map::new(),
        }
    }

    /// A client principal
    pub fn client(client_id: impl Into<String>) -> Self {
        Self {
            name: client_id.into(),
            kind: PrincipalKind::Client,
            authorities: BTreeSet::new(),
            attributes: Map::new(),
        }
    }

    /// Whether this principal is a resource owner
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.kind == PrincipalKind::User
    }
}
