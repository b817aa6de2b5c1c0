// ABOUTME: SQLite authorization store with one flat row per authorization
// ABOUTME: Slot values carry unique indexes; the full aggregate is kept as JSON for lookups
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, error};

use super::transactions::{retry_transaction, SqliteTransactionGuard};
use super::{join_delimited, MAX_WRITE_RETRIES};
use crate::errors::{AppError, AppResult};
use crate::oauth2_server::authorization::Authorization;
use crate::oauth2_server::store::AuthorizationService;
use crate::oauth2_server::types::{OAuth2TokenType, TokenSlot};

/// Column prefix of a token slot
const fn slot_prefix(slot: TokenSlot) -> &'static str {
    match slot {
        TokenSlot::AuthorizationCode => "authorization_code",
        TokenSlot::AccessToken => "access_token",
        TokenSlot::RefreshToken => "refresh_token",
        TokenSlot::IdToken => "oidc_id_token",
        TokenSlot::UserCode => "user_code",
        TokenSlot::DeviceCode => "device_code",
    }
}

/// Indexed column queried by `find_by_token`
const fn lookup_column(token_type: OAuth2TokenType) -> &'static str {
    match token_type {
        OAuth2TokenType::State => "state",
        OAuth2TokenType::Token(TokenSlot::AuthorizationCode) => "authorization_code_value",
        OAuth2TokenType::Token(TokenSlot::AccessToken) => "access_token_value",
        OAuth2TokenType::Token(TokenSlot::RefreshToken) => "refresh_token_value",
        OAuth2TokenType::Token(TokenSlot::IdToken) => "oidc_id_token_value",
        OAuth2TokenType::Token(TokenSlot::UserCode) => "user_code_value",
        OAuth2TokenType::Token(TokenSlot::DeviceCode) => "device_code_value",
    }
}

fn timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|at| at.to_rfc3339())
}

/// Flattened column/value pairs of one authorization row
struct AuthorizationRow {
    id: String,
    columns: Vec<(String, Option<String>)>,
}

impl AuthorizationRow {
    fn from_authorization(authorization: &Authorization) -> AppResult<Self> {
        let mut columns: Vec<(String, Option<String>)> = vec![
            ("id".to_owned(), Some(authorization.id.clone())), // Safe: row owns its values
            (
                "registered_client_id".to_owned(),
                Some(authorization.registered_client_id.clone()), // Safe: row owns its values
            ),
            (
                "principal_name".to_owned(),
                Some(authorization.principal_name.clone()), // Safe: row owns its values
            ),
            (
                "authorization_grant_type".to_owned(),
                Some(authorization.authorization_grant_type.as_str().to_owned()),
            ),
            (
                "authorized_scopes".to_owned(),
                Some(join_delimited(
                    authorization.authorized_scopes.iter().map(String::as_str),
                )),
            ),
            (
                "attributes".to_owned(),
                Some(serde_json::to_string(&authorization.attributes)?),
            ),
            ("state".to_owned(), authorization.state().map(str::to_owned)),
        ];

        for slot in TokenSlot::ALL {
            let prefix = slot_prefix(slot);
            let token = authorization.token(slot);
            columns.push((format!("{prefix}_value"), token.map(|t| t.value.clone()))); // Safe: row owns its values
            columns.push((
                format!("{prefix}_issued_at"),
                timestamp(token.and_then(|t| t.issued_at)),
            ));
            columns.push((
                format!("{prefix}_expires_at"),
                timestamp(token.and_then(|t| t.expires_at)),
            ));
            columns.push((
                format!("{prefix}_metadata"),
                token.map(|t| serde_json::to_string(&t.metadata)).transpose()?,
            ));
        }

        let access_token = authorization.access_token();
        columns.push((
            "access_token_type".to_owned(),
            access_token.and_then(|t| t.token_type.clone()), // Safe: row owns its values
        ));
        columns.push((
            "access_token_scopes".to_owned(),
            access_token.map(|t| join_delimited(t.scopes.iter().map(String::as_str))),
        ));
        columns.push((
            "oidc_id_token_claims".to_owned(),
            authorization
                .token(TokenSlot::IdToken)
                .and_then(|t| t.claims())
                .map(serde_json::to_string)
                .transpose()?,
        ));
        columns.push((
            "authorization_object".to_owned(),
            Some(serde_json::to_string(authorization)?),
        ));

        Ok(Self {
            id: authorization.id.clone(), // Safe: row owns its id
            columns,
        })
    }

    fn insert_sql(&self) -> String {
        let names = self
            .columns
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        let placeholders = vec!["?"; names.len()].join(", ");
        format!(
            "INSERT INTO oauth2_authorization ({}) VALUES ({placeholders})",
            names.join(", ")
        )
    }
}

/// Authorization store backed by the `oauth2_authorization` table
#[derive(Clone)]
pub struct SqliteAuthorizationService {
    pool: SqlitePool,
}

impl SqliteAuthorizationService {
    /// Create the store over a pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn write_row(&self, row: &AuthorizationRow, sql: &str) -> AppResult<()> {
        let tx = self.pool.begin().await?;
        let mut guard = SqliteTransactionGuard::new(tx);

        sqlx::query("DELETE FROM oauth2_authorization WHERE id = ?")
            .bind(&row.id)
            .execute(guard.executor()?)
            .await?;

        let mut insert = sqlx::query(sql);
        for (_, value) in &row.columns {
            insert = insert.bind(value.as_deref());
        }
        insert.execute(guard.executor()?).await?;

        guard.commit().await
    }

    async fn find_by_column(&self, column: &str, value: &str) -> AppResult<Option<Authorization>> {
        let row = sqlx::query(&format!(
            "SELECT authorization_object FROM oauth2_authorization WHERE {column} = ?"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let object: String = row.try_get("authorization_object")?;
            serde_json::from_str::<Authorization>(&object).map_err(|e| {
                error!(error = %e, "Stored authorization is not readable");
                AppError::database(format!("Corrupt authorization record: {e}"))
            })
        })
        .transpose()
    }
}

#[async_trait]
impl AuthorizationService for SqliteAuthorizationService {
    async fn save(&self, authorization: &Authorization) -> AppResult<()> {
        let row = AuthorizationRow::from_authorization(authorization)?;
        let sql = row.insert_sql();
        retry_transaction(|| self.write_row(&row, &sql), MAX_WRITE_RETRIES).await?;

        debug!(
            authorization_id = %authorization.id,
            grant_type = %authorization.authorization_grant_type,
            slots = authorization.tokens.len(),
            "Saved authorization"
        );
        Ok(())
    }

    async fn remove_by_id(&self, id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM oauth2_authorization WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        debug!(authorization_id = %id, removed = result.rows_affected(), "Removed authorization");
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Authorization>> {
        self.find_by_column("id", id).await
    }

    async fn find_by_token(
        &self,
        token: &str,
        token_type: Option<OAuth2TokenType>,
    ) -> AppResult<Option<Authorization>> {
        if let Some(token_type) = token_type {
            return self.find_by_column(lookup_column(token_type), token).await;
        }
        for token_type in OAuth2TokenType::LOOKUP_PRECEDENCE {
            if let Some(found) = self.find_by_column(lookup_column(token_type), token).await? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}
