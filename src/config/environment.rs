// ABOUTME: Environment-based server configuration
// ABOUTME: Loads HTTP, database and OAuth2 settings with validated defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::env;
use std::fmt;
use std::path::PathBuf;

use tracing::info;
use url::Url;

use crate::constants::env_keys;
use crate::constants::oauth2::{DEFAULT_PASSWORD_PARAMETER, DEFAULT_USERNAME_PARAMETER};
use crate::errors::{AppError, AppResult};

/// Default HTTP port
const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default database location
const DEFAULT_DATABASE_URL: &str = "sqlite:./data/authz.db";

/// Path of the device verification endpoint
const DEVICE_VERIFICATION_PATH: &str = "/oauth2/device_verification";

/// Database location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    /// `SQLite` database with file path
    SQLite {
        /// Path to `SQLite` database file
        path: PathBuf,
    },
    /// In-memory `SQLite` (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string with validation
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a `sqlite:` URL
    pub fn parse_url(s: &str) -> AppResult<Self> {
        let path_str = s.strip_prefix("sqlite:").ok_or_else(|| {
            AppError::config(format!("Unsupported database URL (expected sqlite:): {s}"))
        })?;
        let path_str = path_str.trim_start_matches("//");
        if path_str == ":memory:" || path_str.is_empty() {
            Ok(Self::Memory)
        } else {
            Ok(Self::SQLite {
                path: PathBuf::from(path_str),
            })
        }
    }

    /// Connection string understood by `sqlx`
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_owned(),
        }
    }

    /// Whether this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_connection_string())
    }
}

/// OAuth2 server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Settings {
    /// Issuer placed in the `iss` claim (absolute URL)
    pub issuer_url: Option<Url>,
    /// Glob patterns whose requests skip bearer authentication
    pub ignore_urls: Vec<String>,
    /// Password grant username parameter name
    pub username_parameter_name: String,
    /// Password grant password parameter name
    pub password_parameter_name: String,
    /// PEM public key location
    pub jwt_public_key_location: Option<String>,
    /// PEM private key location
    pub jwt_private_key_location: Option<String>,
    /// Verification URI handed out by the device authorization endpoint
    pub device_verification_uri: String,
}

impl Default for OAuth2Settings {
    fn default() -> Self {
        Self {
            issuer_url: None,
            ignore_urls: Vec::new(),
            username_parameter_name: DEFAULT_USERNAME_PARAMETER.to_owned(),
            password_parameter_name: DEFAULT_PASSWORD_PARAMETER.to_owned(),
            jwt_public_key_location: None,
            jwt_private_key_location: None,
            device_verification_uri: DEVICE_VERIFICATION_PATH.to_owned(),
        }
    }
}

impl OAuth2Settings {
    /// Load OAuth2 settings from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer URL is not an absolute URL
    pub fn from_env() -> AppResult<Self> {
        let issuer_url = optional_env(env_keys::OAUTH2_ISSUER_URL)
            .map(|value| parse_issuer(&value))
            .transpose()?;

        let device_verification_uri = optional_env(env_keys::OAUTH2_DEVICE_VERIFICATION_URI)
            .unwrap_or_else(|| default_verification_uri(issuer_url.as_ref()));

        Ok(Self {
            issuer_url,
            ignore_urls: parse_list(&env_var_or(env_keys::OAUTH2_IGNORE_URLS, "")),
            username_parameter_name: env_var_or(
                env_keys::OAUTH2_USERNAME_PARAMETER_NAME,
                DEFAULT_USERNAME_PARAMETER,
            ),
            password_parameter_name: env_var_or(
                env_keys::OAUTH2_PASSWORD_PARAMETER_NAME,
                DEFAULT_PASSWORD_PARAMETER,
            ),
            jwt_public_key_location: optional_env(env_keys::OAUTH2_JWT_PUBLIC_KEY_LOCATION),
            jwt_private_key_location: optional_env(env_keys::OAUTH2_JWT_PRIVATE_KEY_LOCATION),
            device_verification_uri,
        })
    }

    /// Issuer as a string, without a trailing slash
    #[must_use]
    pub fn issuer(&self) -> Option<String> {
        self.issuer_url
            .as_ref()
            .map(|url| url.as_str().trim_end_matches('/').to_owned())
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Database location
    pub database: DatabaseUrl,
    /// Comma separated allowed CORS origins, `*` for any
    pub cors_allowed_origins: String,
    /// OAuth2 settings
    pub oauth2: OAuth2Settings,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid
    pub fn from_env() -> AppResult<Self> {
        info!("Loading configuration from environment variables");

        let http_port = env_var_or(env_keys::HTTP_PORT, &DEFAULT_HTTP_PORT.to_string())
            .parse::<u16>()
            .map_err(|e| AppError::config(format!("Invalid {}: {e}", env_keys::HTTP_PORT)))?;

        let config = Self {
            http_port,
            database: DatabaseUrl::parse_url(&env_var_or(
                env_keys::DATABASE_URL,
                DEFAULT_DATABASE_URL,
            ))?,
            cors_allowed_origins: env_var_or(env_keys::CORS_ALLOWED_ORIGINS, "*"),
            oauth2: OAuth2Settings::from_env()?,
        };

        info!(
            http_port = config.http_port,
            database = %config.database,
            issuer = ?config.oauth2.issuer(),
            ignore_urls = config.oauth2.ignore_urls.len(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

fn parse_issuer(value: &str) -> AppResult<Url> {
    let url = Url::parse(value)
        .map_err(|e| AppError::config(format!("Issuer URL must be an absolute URL: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(AppError::config(format!(
            "Issuer URL must be an absolute URL: {value}"
        )));
    }
    Ok(url)
}

fn default_verification_uri(issuer: Option<&Url>) -> String {
    issuer.map_or_else(
        || DEVICE_VERIFICATION_PATH.to_owned(),
        |url| {
            format!(
                "{}{DEVICE_VERIFICATION_PATH}",
                url.as_str().trim_end_matches('/')
            )
        },
    )
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse a comma-separated list
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}
