// ABOUTME: Authorization server binary
// ABOUTME: Loads configuration, prepares storage and signing keys, then serves until Ctrl-C
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Authorization Server Binary
//!
//! Starts the OAuth 2.0 / OIDC authorization server.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use authz_server::{
    config::{DatabaseUrl, ServerConfig},
    database::Database,
    logging::LoggingConfig,
    server::{serve, ServerResources},
};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "authz-server")]
#[command(about = "OAuth 2.0 / OpenID Connect authorization server")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override database URL (`sqlite:<path>` or `sqlite::memory:`)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server error: {e:#}");
            eprintln!("authz-server: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    LoggingConfig::from_env().init()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    if let Some(database_url) = args.database_url {
        config.database = DatabaseUrl::parse_url(&database_url)?;
    }

    let database = Database::new(&config.database).await?;
    let resources = Arc::new(ServerResources::new(config, database)?);

    // Without a signing key no token can ever be issued
    let key_set = resources.key_manager.signing_key_set().await?;
    info!(kid = %key_set.kid(), "Signing key ready");

    serve(resources).await?;
    Ok(())
}
