// ABOUTME: SQLite registered client store
// ABOUTME: Sets are stored comma-delimited, settings as JSON with ISO-8601 durations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::{join_delimited, split_delimited};
use crate::errors::{AppError, AppResult};
use crate::oauth2_server::durations::{format_duration, parse_duration};
use crate::oauth2_server::registered_client::{ClientSettings, RegisteredClient, TokenSettings};
use crate::oauth2_server::store::RegisteredClientRepository;
use crate::oauth2_server::types::{SignatureAlgorithm, TokenFormat};

/// Registered client store backed by the `oauth2_registered_client` table
#[derive(Clone)]
pub struct SqliteRegisteredClientRepository {
    pool: SqlitePool,
}

impl SqliteRegisteredClientRepository {
    /// Create the store over a pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_by(&self, column: &str, value: &str) -> AppResult<Option<RegisteredClient>> {
        sqlx::query(&format!(
            "SELECT * FROM oauth2_registered_client WHERE {column} = ?"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| client_from_row(&row))
        .transpose()
    }
}

#[async_trait]
impl RegisteredClientRepository for SqliteRegisteredClientRepository {
    async fn save(&self, client: &RegisteredClient) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO oauth2_registered_client (
                id, client_id, client_id_issued_at, client_secret, client_secret_expires_at,
                client_name, client_authentication_methods, authorization_grant_types,
                redirect_uris, post_logout_redirect_uris, scopes, client_settings, token_settings
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                client_id = excluded.client_id,
                client_id_issued_at = excluded.client_id_issued_at,
                client_secret = excluded.client_secret,
                client_secret_expires_at = excluded.client_secret_expires_at,
                client_name = excluded.client_name,
                client_authentication_methods = excluded.client_authentication_methods,
                authorization_grant_types = excluded.authorization_grant_types,
                redirect_uris = excluded.redirect_uris,
                post_logout_redirect_uris = excluded.post_logout_redirect_uris,
                scopes = excluded.scopes,
                client_settings = excluded.client_settings,
                token_settings = excluded.token_settings
            ",
        )
        .bind(&client.id)
        .bind(&client.client_id)
        .bind(client.client_id_issued_at.map(|at| at.to_rfc3339()))
        .bind(client.client_secret.as_deref())
        .bind(client.client_secret_expires_at.map(|at| at.to_rfc3339()))
        .bind(&client.client_name)
        .bind(join_delimited(
            client.client_authentication_methods.iter().map(|m| m.as_str()),
        ))
        .bind(join_delimited(
            client.authorization_grant_types.iter().map(|g| g.as_str()),
        ))
        .bind(join_delimited(client.redirect_uris.iter().map(String::as_str)))
        .bind(join_delimited(
            client.post_logout_redirect_uris.iter().map(String::as_str),
        ))
        .bind(join_delimited(client.scopes.iter().map(String::as_str)))
        .bind(client_settings_json(&client.client_settings).to_string())
        .bind(token_settings_json(&client.token_settings).to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::already_exists(format!("Client {}", client.client_id))
            }
            other => other.into(),
        })?;

        debug!(client_id = %client.client_id, "Saved registered client");
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<RegisteredClient>> {
        self.find_by("id", id).await
    }

    async fn find_by_client_id(&self, client_id: &str) -> AppResult<Option<RegisteredClient>> {
        self.find_by("client_id", client_id).await
    }
}

fn set_of<T: From<String> + Ord>(value: Option<&str>) -> BTreeSet<T> {
    split_delimited(value).map(|entry| T::from(entry.to_owned())).collect()
}

fn parse_timestamp(value: Option<String>) -> AppResult<Option<DateTime<Utc>>> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|at| at.with_timezone(&Utc))
                .map_err(|e| AppError::database(format!("Invalid stored timestamp '{raw}': {e}")))
        })
        .transpose()
}

fn client_from_row(row: &SqliteRow) -> AppResult<RegisteredClient> {
    let client_settings: String = row.try_get("client_settings")?;
    let token_settings: String = row.try_get("token_settings")?;

    Ok(RegisteredClient {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        client_id_issued_at: parse_timestamp(row.try_get("client_id_issued_at")?)?,
        client_secret: row.try_get("client_secret")?,
        client_secret_expires_at: parse_timestamp(row.try_get("client_secret_expires_at")?)?,
        client_name: row.try_get("client_name")?,
        client_authentication_methods: set_of(
            row.try_get::<Option<String>, _>("client_authentication_methods")?
                .as_deref(),
        ),
        authorization_grant_types: set_of(
            row.try_get::<Option<String>, _>("authorization_grant_types")?
                .as_deref(),
        ),
        redirect_uris: set_of(row.try_get::<Option<String>, _>("redirect_uris")?.as_deref()),
        post_logout_redirect_uris: set_of(
            row.try_get::<Option<String>, _>("post_logout_redirect_uris")?
                .as_deref(),
        ),
        scopes: set_of(row.try_get::<Option<String>, _>("scopes")?.as_deref()),
        client_settings: client_settings_from_json(&serde_json::from_str(&client_settings)?),
        token_settings: token_settings_from_json(&serde_json::from_str(&token_settings)?)?,
    })
}

fn client_settings_json(settings: &ClientSettings) -> Value {
    json!({
        "require_proof_key": settings.require_proof_key,
        "require_authorization_consent": settings.require_authorization_consent,
        "jwk_set_url": settings.jwk_set_url,
        "token_endpoint_authentication_signing_algorithm":
            settings.token_endpoint_authentication_signing_algorithm.map(|a| a.as_str()),
        "x509_certificate_subject_dn": settings.x509_certificate_subject_dn,
    })
}

fn client_settings_from_json(value: &Map<String, Value>) -> ClientSettings {
    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_owned);
    let flag = |key: &str| value.get(key).and_then(Value::as_bool).unwrap_or(false);
    ClientSettings {
        require_proof_key: flag("require_proof_key"),
        require_authorization_consent: flag("require_authorization_consent"),
        jwk_set_url: text("jwk_set_url"),
        token_endpoint_authentication_signing_algorithm: text(
            "token_endpoint_authentication_signing_algorithm",
        )
        .as_deref()
        .and_then(SignatureAlgorithm::parse),
        x509_certificate_subject_dn: text("x509_certificate_subject_dn"),
    }
}

fn token_settings_json(settings: &TokenSettings) -> Value {
    json!({
        "authorization_code_time_to_live": format_duration(settings.authorization_code_time_to_live),
        "access_token_time_to_live": format_duration(settings.access_token_time_to_live),
        "access_token_format": settings.access_token_format.as_str(),
        "device_code_time_to_live": format_duration(settings.device_code_time_to_live),
        "user_code_time_to_live": format_duration(settings.user_code_time_to_live),
        "reuse_refresh_tokens": settings.reuse_refresh_tokens,
        "refresh_token_time_to_live": format_duration(settings.refresh_token_time_to_live),
        "id_token_signature_algorithm": settings.id_token_signature_algorithm.as_str(),
        "x509_certificate_bound_access_tokens": settings.x509_certificate_bound_access_tokens,
    })
}

/// Missing keys keep their defaults; malformed values are errors
fn token_settings_from_json(value: &Map<String, Value>) -> AppResult<TokenSettings> {
    let mut settings = TokenSettings::default();
    let duration = |key: &str| {
        value
            .get(key)
            .map(|raw| match raw {
                Value::Number(seconds) => parse_duration(&seconds.to_string()),
                Value::String(text) => parse_duration(text),
                other => Err(AppError::invalid_input(format!(
                    "Invalid duration for {key}: {other}"
                ))),
            })
            .transpose()
    };

    if let Some(ttl) = duration("authorization_code_time_to_live")? {
        settings.authorization_code_time_to_live = ttl;
    }
    if let Some(ttl) = duration("access_token_time_to_live")? {
        settings.access_token_time_to_live = ttl;
    }
    if let Some(ttl) = duration("device_code_time_to_live")? {
        settings.device_code_time_to_live = ttl;
    }
    if let Some(ttl) = duration("user_code_time_to_live")? {
        settings.user_code_time_to_live = ttl;
    }
    if let Some(ttl) = duration("refresh_token_time_to_live")? {
        settings.refresh_token_time_to_live = ttl;
    }
    if let Some(format) = value.get("access_token_format").and_then(Value::as_str) {
        settings.access_token_format = TokenFormat::parse(format).ok_or_else(|| {
            AppError::invalid_input(format!("Unknown access token format: {format}"))
        })?;
    }
    if let Some(algorithm) = value
        .get("id_token_signature_algorithm")
        .and_then(Value::as_str)
    {
        settings.id_token_signature_algorithm =
            SignatureAlgorithm::parse(algorithm).ok_or_else(|| {
                AppError::invalid_input(format!("Unknown signature algorithm: {algorithm}"))
            })?;
    }
    if let Some(reuse) = value.get("reuse_refresh_tokens").and_then(Value::as_bool) {
        settings.reuse_refresh_tokens = reuse;
    }
    if let Some(bound) = value
        .get("x509_certificate_bound_access_tokens")
        .and_then(Value::as_bool)
    {
        settings.x509_certificate_bound_access_tokens = bound;
    }
    Ok(settings)
}
