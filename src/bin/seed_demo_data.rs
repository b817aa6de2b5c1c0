// ABOUTME: Demo data seeder for local development
// ABOUTME: Registers the democlient and a demo resource owner
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Demo data seeder.
//!
//! Usage:
//! ```bash
//! cargo run --bin seed-demo-data
//! cargo run --bin seed-demo-data -- --database-url sqlite:./data/authz.db
//! ```

use std::collections::BTreeSet;

use anyhow::Result;
use authz_server::{
    config::{DatabaseUrl, ServerConfig},
    database::Database,
    logging::LoggingConfig,
    oauth2_server::{
        password_encoder, AuthorizationGrantType, ClientAuthenticationMethod,
        RegisteredClient, RegisteredClientRepository, TokenFormat, UserDetails,
    },
};
use chrono::Duration;
use clap::Parser;
use serde_json::Map;
use tracing::info;

const DEMO_CLIENT_ID: &str = "democlient";
const DEMO_CLIENT_SECRET: &str = "{noop}demosecret";
const DEMO_USERNAME: &str = "demo";
const DEMO_PASSWORD: &str = "demopassword";

#[derive(Parser)]
#[command(
    name = "seed-demo-data",
    about = "Authorization server demo data seeder",
    long_about = "Register the demo client and demo user"
)]
struct SeedArgs {
    /// Database URL override
    #[arg(long)]
    database_url: Option<String>,

    /// Local redirect URI registered for the authorization code flow
    #[arg(long, default_value = "http://127.0.0.1:8080/authorized")]
    redirect_uri: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = SeedArgs::parse();
    LoggingConfig::from_env().init()?;

    let database_url = match args.database_url {
        Some(url) => DatabaseUrl::parse_url(&url)?,
        None => ServerConfig::from_env()?.database,
    };
    let database = Database::new(&database_url).await?;

    let clients = database.registered_clients();
    let client = match clients.find_by_client_id(DEMO_CLIENT_ID).await? {
        // Keep the internal id so re-seeding updates in place
        Some(existing) => RegisteredClient {
            id: existing.id,
            ..demo_client(&args.redirect_uri)
        },
        None => demo_client(&args.redirect_uri),
    };
    clients.save(&client).await?;
    info!(client_id = DEMO_CLIENT_ID, "Seeded demo client");

    let password_hash = password_encoder::hash_password(DEMO_PASSWORD, bcrypt::DEFAULT_COST)?;
    database
        .users()
        .save_user(&UserDetails {
            username: DEMO_USERNAME.to_owned(),
            password_hash,
            enabled: true,
            account_non_locked: true,
            authorities: BTreeSet::from(["ROLE_USER".to_owned()]),
            attributes: Map::new(),
        })
        .await?;
    info!(username = DEMO_USERNAME, "Seeded demo user");

    println!("Demo data ready:");
    println!("  client: {DEMO_CLIENT_ID} / demosecret");
    println!("  user:   {DEMO_USERNAME} / {DEMO_PASSWORD}");
    Ok(())
}

fn demo_client(redirect_uri: &str) -> RegisteredClient {
    let mut client = RegisteredClient::new(DEMO_CLIENT_ID);
    client.client_name = "Demo Client".to_owned();
    client.client_secret = Some(DEMO_CLIENT_SECRET.to_owned());
    client.client_authentication_methods = BTreeSet::from([
        ClientAuthenticationMethod::ClientSecretBasic,
        ClientAuthenticationMethod::ClientSecretPost,
    ]);
    client.authorization_grant_types = BTreeSet::from([
        AuthorizationGrantType::Password,
        AuthorizationGrantType::RefreshToken,
        AuthorizationGrantType::ClientCredentials,
        AuthorizationGrantType::AuthorizationCode,
        AuthorizationGrantType::DeviceCode,
    ]);
    client.redirect_uris = BTreeSet::from([redirect_uri.to_owned()]);
    client.scopes = ["openid", "profile", "read", "write"]
        .map(str::to_owned)
        .into();
    client.token_settings.access_token_format = TokenFormat::Reference;
    client.token_settings.access_token_time_to_live = Duration::seconds(3600);
    client
}
