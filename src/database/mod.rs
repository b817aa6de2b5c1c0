// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Database Management
//!
//! `SQLite` persistence for the authorization server: authorizations,
//! registered clients and resource owners. Each store owns one table and
//! implements the matching trait from [`crate::oauth2_server::store`] or
//! [`crate::oauth2_server::authentication`].

mod authorizations;
mod registered_clients;
pub mod transactions;
mod users;

pub use authorizations::SqliteAuthorizationService;
pub use registered_clients::SqliteRegisteredClientRepository;
pub use users::SqliteUserDetailsService;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::info;

use crate::config::DatabaseUrl;
use crate::errors::AppResult;

/// Maximum attempts for a write that hits a locked database
pub(crate) const MAX_WRITE_RETRIES: u32 = 3;

/// Database manager owning the connection pool
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated
    pub async fn new(database_url: &DatabaseUrl) -> AppResult<Self> {
        let pool = match database_url {
            // Every in-memory connection is a separate database; keep one
            DatabaseUrl::Memory => {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect(&database_url.to_connection_string())
                    .await?
            }
            DatabaseUrl::SQLite { path } => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        crate::errors::AppError::database(format!(
                            "Cannot create database directory {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
                // Ensure SQLite creates the database file if it doesn't exist
                SqlitePool::connect(&format!("{}?mode=rwc", database_url.to_connection_string()))
                    .await?
            }
        };

        let db = Self { pool };
        db.migrate().await?;
        info!(database = %database_url, "Database ready");
        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Authorization store over this database
    #[must_use]
    pub fn authorizations(&self) -> SqliteAuthorizationService {
        SqliteAuthorizationService::new(self.pool.clone())
    }

    /// Registered client store over this database
    #[must_use]
    pub fn registered_clients(&self) -> SqliteRegisteredClientRepository {
        SqliteRegisteredClientRepository::new(self.pool.clone())
    }

    /// User store over this database
    #[must_use]
    pub fn users(&self) -> SqliteUserDetailsService {
        SqliteUserDetailsService::new(self.pool.clone())
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if a table or index cannot be created
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_authorizations().await?;
        self.migrate_registered_clients().await?;
        self.migrate_users().await?;
        Ok(())
    }

    async fn migrate_authorizations(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth2_authorization (
                id TEXT PRIMARY KEY,
                registered_client_id TEXT NOT NULL,
                principal_name TEXT NOT NULL,
                authorization_grant_type TEXT NOT NULL,
                authorized_scopes TEXT,
                attributes TEXT,
                state TEXT,
                authorization_code_value TEXT,
                authorization_code_issued_at TEXT,
                authorization_code_expires_at TEXT,
                authorization_code_metadata TEXT,
                access_token_value TEXT,
                access_token_issued_at TEXT,
                access_token_expires_at TEXT,
                access_token_metadata TEXT,
                access_token_type TEXT,
                access_token_scopes TEXT,
                oidc_id_token_value TEXT,
                oidc_id_token_issued_at TEXT,
                oidc_id_token_expires_at TEXT,
                oidc_id_token_metadata TEXT,
                oidc_id_token_claims TEXT,
                refresh_token_value TEXT,
                refresh_token_issued_at TEXT,
                refresh_token_expires_at TEXT,
                refresh_token_metadata TEXT,
                user_code_value TEXT,
                user_code_issued_at TEXT,
                user_code_expires_at TEXT,
                user_code_metadata TEXT,
                device_code_value TEXT,
                device_code_issued_at TEXT,
                device_code_expires_at TEXT,
                device_code_metadata TEXT,
                authorization_object TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        for column in [
            "state",
            "authorization_code_value",
            "access_token_value",
            "oidc_id_token_value",
            "refresh_token_value",
            "user_code_value",
            "device_code_value",
        ] {
            sqlx::query(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_oauth2_authorization_{column} \
                 ON oauth2_authorization({column})"
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn migrate_registered_clients(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth2_registered_client (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL UNIQUE,
                client_id_issued_at TEXT,
                client_secret TEXT,
                client_secret_expires_at TEXT,
                client_name TEXT NOT NULL,
                client_authentication_methods TEXT NOT NULL,
                authorization_grant_types TEXT NOT NULL,
                redirect_uris TEXT,
                post_logout_redirect_uris TEXT,
                scopes TEXT NOT NULL,
                client_settings TEXT NOT NULL,
                token_settings TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn migrate_users(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT true,
                account_non_locked BOOLEAN NOT NULL DEFAULT true,
                authorities TEXT NOT NULL DEFAULT '',
                attributes TEXT NOT NULL DEFAULT '{}',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Join a set into the comma-delimited storage form
pub(crate) fn join_delimited<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    values.into_iter().collect::<Vec<_>>().join(",")
}

/// Split the comma-delimited storage form, trimming and dropping empties
pub(crate) fn split_delimited(value: Option<&str>) -> impl Iterator<Item = &str> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
}
