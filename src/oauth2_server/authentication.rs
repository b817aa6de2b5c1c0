// ABOUTME: Resource owner authentication: user lookup and credential verification
// ABOUTME: Bad credentials of every kind collapse into one invalid_grant outcome
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::models::OAuth2Error;
use super::password_encoder;
use super::principal::AuthenticatedPrincipal;
use crate::constants::oauth2::{AUTHORITIES_CLAIM, USERNAME_ATTRIBUTE};
use crate::errors::{AppError, AppResult};

/// Message returned for every credential failure
const BAD_CREDENTIALS: &str = "Bad credentials";

/// Stored user record consumed by authentication and introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDetails {
    /// Login name
    pub username: String,
    /// Encoded password
    pub password_hash: String,
    /// Disabled users cannot authenticate
    pub enabled: bool,
    /// Locked users cannot authenticate
    pub account_non_locked: bool,
    /// Granted authorities (roles and permissions)
    pub authorities: BTreeSet<String>,
    /// Extra profile attributes
    pub attributes: Map<String, Value>,
}

impl UserDetails {
    /// Principal view of this user; attributes gain `username` and `authorities`
    #[must_use]
    pub fn to_principal(&self) -> AuthenticatedPrincipal {
        let mut principal =
            AuthenticatedPrincipal::user(self.username.clone(), self.authorities.clone()); // Safe: principal is an owned snapshot
        principal.attributes = self.attributes.clone(); // Safe: principal is an owned snapshot
        principal.attributes.insert(
            USERNAME_ATTRIBUTE.to_owned(),
            Value::String(self.username.clone()), // Safe: attribute owns its value
        );
        principal.attributes.insert(
            AUTHORITIES_CLAIM.to_owned(),
            Value::Array(
                self.authorities
                    .iter()
                    .map(|authority| Value::String(authority.clone())) // Safe: JSON owns its strings
                    .collect(),
            ),
        );
        principal
    }
}

/// Loads users by name
#[async_trait]
pub trait UserDetailsService: Send + Sync {
    /// Load a user
    ///
    /// Returns a `ResourceNotFound` error when the user does not exist.
    async fn load_user_by_username(&self, username: &str) -> AppResult<UserDetails>;
}

/// Authenticates a resource owner by username and password
#[async_trait]
pub trait AuthenticationManager: Send + Sync {
    /// Authenticate and return the principal
    ///
    /// Any credential failure is an `invalid_grant` error.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticatedPrincipal, OAuth2Error>;
}

/// Authentication backed by a [`UserDetailsService`] and encoded passwords
pub struct DaoAuthenticationManager {
    users: Arc<dyn UserDetailsService>,
}

impl DaoAuthenticationManager {
    /// Create a manager over a user source
    #[must_use]
    pub fn new(users: Arc<dyn UserDetailsService>) -> Self {
        Self { users }
    }

    /// Verify a password off the async executor
    async fn verify(password: &str, encoded: String) -> AppResult<bool> {
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || password_encoder::matches(&password, &encoded))
            .await
            .map_err(|e| AppError::internal(format!("Password verification task failed: {e}")))
    }

    /// Spend comparable time on unknown users so existence is not observable
    async fn mitigate_timing(password: &str) {
        static DUMMY_HASH: OnceLock<String> = OnceLock::new();
        let password = password.to_owned();
        let _ = tokio::task::spawn_blocking(move || {
            let hash = DUMMY_HASH.get_or_init(|| {
                bcrypt::hash("user-not-found-placeholder", bcrypt::DEFAULT_COST).unwrap_or_default()
            });
            password_encoder::matches(&password, hash)
        })
        .await;
    }
}

#[async_trait]
impl AuthenticationManager for DaoAuthenticationManager {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticatedPrincipal, OAuth2Error> {
        let user = match self.users.load_user_by_username(username).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                debug!(username = %username, "Authentication failed: unknown user");
                Self::mitigate_timing(password).await;
                return Err(OAuth2Error::invalid_grant(BAD_CREDENTIALS));
            }
            Err(e) => return Err(e.into()),
        };

        // Safe: hash clone moves into the blocking verifier
        if !Self::verify(password, user.password_hash.clone()).await? {
            warn!(username = %username, "Authentication failed: password mismatch");
            return Err(OAuth2Error::invalid_grant(BAD_CREDENTIALS));
        }

        if !user.enabled || !user.account_non_locked {
            warn!(
                username = %username,
                enabled = user.enabled,
                locked = !user.account_non_locked,
                "Authentication failed: account unavailable"
            );
            return Err(OAuth2Error::invalid_grant(BAD_CREDENTIALS));
        }

        Ok(user.to_principal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct InMemoryUsers(HashMap<String, UserDetails>);

    #[async_trait]
    impl UserDetailsService for InMemoryUsers {
        async fn load_user_by_username(&self, username: &str) -> AppResult<UserDetails> {
            self.0
                .get(username)
                .cloned()
                .ok_or_else(|| AppError::not_found(format!("User {username}")))
        }
    }

    fn manager(enabled: bool) -> DaoAuthenticationManager {
        let user = UserDetails {
            username: "demo".to_owned(),
            password_hash: "{noop}demopassword".to_owned(),
            enabled,
            account_non_locked: true,
            authorities: ["ROLE_USER".to_owned()].into(),
            attributes: Map::new(),
        };
        DaoAuthenticationManager::new(Arc::new(InMemoryUsers(HashMap::from([(
            "demo".to_owned(),
            user,
        )]))))
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let principal = manager(true)
            .authenticate("demo", "demopassword")
            .await
            .unwrap();
        assert_eq!(principal.name, "demo");
        assert!(principal.authorities.contains("ROLE_USER"));
        assert_eq!(principal.attributes[USERNAME_ATTRIBUTE], "demo");
    }

    #[tokio::test]
    async fn test_failures_are_indistinguishable() {
        let wrong_password = manager(true).authenticate("demo", "nope").await.unwrap_err();
        let unknown_user = manager(true)
            .authenticate("ghost", "demopassword")
            .await
            .unwrap_err();
        let disabled = manager(false)
            .authenticate("demo", "demopassword")
            .await
            .unwrap_err();

        assert_eq!(wrong_password, unknown_user);
        assert_eq!(wrong_password, disabled);
        assert_eq!(wrong_password.error, "invalid_grant");
    }
}
