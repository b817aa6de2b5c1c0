// ABOUTME: SQLite resource owner store used by password authentication and introspection
// ABOUTME: Loads users by name and upserts the minimal records needed for seeding
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::{join_delimited, split_delimited};
use crate::errors::{AppError, AppResult};
use crate::oauth2_server::authentication::{UserDetails, UserDetailsService};

/// User store backed by the `users` table
#[derive(Clone)]
pub struct SqliteUserDetailsService {
    pool: SqlitePool,
}

impl SqliteUserDetailsService {
    /// Create the store over a pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a user by username
    ///
    /// # Errors
    ///
    /// Returns an error if the attributes cannot be serialized or the write fails
    pub async fn save_user(&self, user: &UserDetails) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO users (username, password_hash, enabled, account_non_locked, authorities, attributes)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(username) DO UPDATE SET
                password_hash = excluded.password_hash,
                enabled = excluded.enabled,
                account_non_locked = excluded.account_non_locked,
                authorities = excluded.authorities,
                attributes = excluded.attributes
            ",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.enabled)
        .bind(user.account_non_locked)
        .bind(join_delimited(user.authorities.iter().map(String::as_str)))
        .bind(serde_json::to_string(&user.attributes)?)
        .execute(&self.pool)
        .await?;

        debug!(username = %user.username, "Saved user");
        Ok(())
    }
}

#[async_trait]
impl UserDetailsService for SqliteUserDetailsService {
    async fn load_user_by_username(&self, username: &str) -> AppResult<UserDetails> {
        let row = sqlx::query(
            r"
            SELECT username, password_hash, enabled, account_non_locked, authorities, attributes
            FROM users WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("User {username}")))?;

        let authorities: String = row.try_get("authorities")?;
        let attributes: String = row.try_get("attributes")?;
        Ok(UserDetails {
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            enabled: row.try_get("enabled")?,
            account_non_locked: row.try_get("account_non_locked")?,
            authorities: split_delimited(Some(&authorities))
                .map(str::to_owned)
                .collect(),
            attributes: serde_json::from_str::<Map<String, Value>>(&attributes)?,
        })
    }
}
