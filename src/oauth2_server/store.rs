// ABOUTME: Storage seams for authorizations and registered clients
// ABOUTME: Async traits implemented by the SQLite repositories in the database module
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use async_trait::async_trait;

use super::authorization::Authorization;
use super::registered_client::RegisteredClient;
use super::types::OAuth2TokenType;
use crate::errors::AppResult;

/// Persistence of [`Authorization`] records
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    /// Insert or replace an authorization by id, atomically
    async fn save(&self, authorization: &Authorization) -> AppResult<()>;

    /// Delete an authorization by id; deleting an absent id is a no-op
    async fn remove_by_id(&self, id: &str) -> AppResult<()>;

    /// Delete an authorization
    async fn remove(&self, authorization: &Authorization) -> AppResult<()> {
        self.remove_by_id(&authorization.id).await
    }

    /// Find an authorization by id
    async fn find_by_id(&self, id: &str) -> AppResult<Option<Authorization>>;

    /// Find the authorization owning a token value
    ///
    /// With a hint only that slot is searched. Without one every slot is
    /// tried in [`OAuth2TokenType::LOOKUP_PRECEDENCE`] order.
    async fn find_by_token(
        &self,
        token: &str,
        token_type: Option<OAuth2TokenType>,
    ) -> AppResult<Option<Authorization>>;
}

/// Persistence of [`RegisteredClient`] registrations
#[async_trait]
pub trait RegisteredClientRepository: Send + Sync {
    /// Insert or replace a client by id
    async fn save(&self, client: &RegisteredClient) -> AppResult<()>;

    /// Find a client by internal id
    async fn find_by_id(&self, id: &str) -> AppResult<Option<RegisteredClient>>;

    /// Find a client by public client id
    async fn find_by_client_id(&self, client_id: &str) -> AppResult<Option<RegisteredClient>>;
}
