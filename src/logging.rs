// ABOUTME: Logging configuration and structured logging setup
// ABOUTME: One tracing subscriber per process, formatted for development or log shipping
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Structured logging for the authorization server binaries.
//!
//! Grant outcomes, storage failures and key fallbacks are emitted as
//! `tracing` events with `client_id`, `grant_type` and `error` fields; this
//! module only decides where and how they are rendered.

use std::env;
use std::io;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{
    filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::constants::{env_keys, service_names};

/// Directives that keep dependency chatter below the server's own events
const QUIET_DEPENDENCIES: [&str; 4] = [
    "hyper=warn",
    "sqlx::query=warn",
    "tower_http=info",
    "h2=warn",
];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Multi-field human readable output
    #[default]
    Pretty,
    /// Single line per event
    Compact,
}

impl LogFormat {
    /// Parse a format name; unknown names fall back to pretty
    #[must_use]
    pub fn from_str_or_default(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directives, `RUST_LOG` syntax
    pub filter: String,
    /// Output format
    pub format: LogFormat,
    /// Include source file and line
    pub include_location: bool,
    /// Include thread ids and names
    pub include_thread: bool,
    /// Service name on the startup event
    pub service_name: String,
    /// Deployment environment
    pub environment: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            format: LogFormat::default(),
            include_location: false,
            include_thread: false,
            service_name: service_names::AUTHZ_SERVER.to_owned(),
            environment: "development".to_owned(),
        }
    }
}

impl LoggingConfig {
    /// Read the logging variables
    ///
    /// Production defaults to JSON with locations and threads unless
    /// `LOG_FORMAT` says otherwise.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let environment = env::var(env_keys::ENVIRONMENT).unwrap_or(defaults.environment);
        let production = environment.eq_ignore_ascii_case("production");

        let format = env::var(env_keys::LOG_FORMAT).map_or(
            if production {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            |value| LogFormat::from_str_or_default(&value),
        );

        Self {
            filter: env::var(env_keys::RUST_LOG).unwrap_or(defaults.filter),
            format,
            include_location: production || env::var_os(env_keys::LOG_INCLUDE_LOCATION).is_some(),
            include_thread: production || env::var_os(env_keys::LOG_INCLUDE_THREAD).is_some(),
            service_name: env::var(env_keys::SERVICE_NAME).unwrap_or(defaults.service_name),
            environment,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        QUIET_DEPENDENCIES
            .iter()
            .filter_map(|directive| directive.parse::<Directive>().ok())
            .fold(EnvFilter::new(&self.filter), EnvFilter::add_directive)
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_writer(io::stderr)
            .with_file(self.include_location)
            .with_line_number(self.include_location)
            .with_thread_ids(self.include_thread)
            .with_thread_names(self.include_thread);

        match self.format {
            LogFormat::Json => layer.json().with_current_span(true).boxed(),
            LogFormat::Pretty => layer.with_target(true).boxed(),
            LogFormat::Compact => layer.compact().with_target(false).boxed(),
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed
    pub fn init(&self) -> Result<()> {
        tracing_subscriber::registry()
            .with(self.fmt_layer())
            .with(self.env_filter())
            .try_init()?;

        info!(
            service.name = %self.service_name,
            service.version = env!("CARGO_PKG_VERSION"),
            environment = %self.environment,
            log.filter = %self.filter,
            log.format = ?self.format,
            "Logging initialized"
        );
        Ok(())
    }
}
