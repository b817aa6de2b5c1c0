// ABOUTME: Token generator chain producing access, refresh, ID, code and device tokens
// ABOUTME: Reference or self-contained access tokens are chosen by the client's token format
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Token generation
//!
//! Every token the server issues comes from a [`DelegatingTokenGenerator`]:
//! an ordered list of [`OAuth2TokenGenerator`]s, each asked in turn whether
//! it supports the requested [`TokenContext`]. The first one that does is
//! the only one that runs. A generator may still decline at generation time
//! (a refresh token for a public client, for instance), in which case no
//! token is produced.
//!
//! Grants that require a token call [`DelegatingTokenGenerator::generate`],
//! which turns "nothing generated" into a `server_error`. Grants for which a
//! token is optional call [`DelegatingTokenGenerator::try_generate`].

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde_json::{json, Map, Value};
use tracing::{debug, error};
use uuid::Uuid;

use super::authorization::{Authorization, OAuth2Token};
use super::models::OAuth2Error;
use super::principal::AuthenticatedPrincipal;
use super::registered_client::RegisteredClient;
use super::types::{AuthorizationGrantType, TokenFormat, TokenSlot};
use crate::constants::oauth2::{
    AUTHORITIES_CLAIM, AUTHORIZATION_REQUEST_ATTRIBUTE, BEARER_TOKEN_TYPE, CODE_BYTES,
    ID_TOKEN_TTL_MINUTES, USER_CODE_ALPHABET, USER_CODE_LENGTH,
};
use crate::errors::AppResult;
use crate::jwks::SigningKeyManager;

/// Everything a generator may need to produce one token
#[derive(Debug, Clone, Copy)]
pub struct TokenContext<'a> {
    /// Client the token is issued to
    pub registered_client: &'a RegisteredClient,
    /// Principal the token is issued for
    pub principal: &'a AuthenticatedPrincipal,
    /// Authorization under construction or being refreshed
    pub authorization: Option<&'a Authorization>,
    /// Scopes granted to the token
    pub authorized_scopes: &'a BTreeSet<String>,
    /// Grant being executed
    pub grant_type: &'a AuthorizationGrantType,
    /// Kind of token requested
    pub token_type: TokenSlot,
    /// Issuer identifier, when configured
    pub issuer: Option<&'a str>,
}

impl<'a> TokenContext<'a> {
    /// Same context for a different token kind
    #[must_use]
    pub const fn for_token(self, token_type: TokenSlot) -> Self {
        Self { token_type, ..self }
    }

    /// Same context with the authorization assembled so far
    #[must_use]
    pub const fn with_authorization(self, authorization: &'a Authorization) -> Self {
        Self {
            authorization: Some(authorization),
            ..self
        }
    }
}

/// A strategy producing one kind of token
#[async_trait]
pub trait OAuth2TokenGenerator: Send + Sync {
    /// Whether this generator handles the context
    fn supports(&self, context: &TokenContext<'_>) -> bool;

    /// Generate a token; `Ok(None)` when the generator declines
    async fn generate(&self, context: &TokenContext<'_>) -> AppResult<Option<OAuth2Token>>;
}

/// Ordered chain of generators; the first supporting generator wins
pub struct DelegatingTokenGenerator {
    generators: Vec<Arc<dyn OAuth2TokenGenerator>>,
}

impl DelegatingTokenGenerator {
    /// Build a chain from generators in priority order
    #[must_use]
    pub fn new(generators: Vec<Arc<dyn OAuth2TokenGenerator>>) -> Self {
        Self { generators }
    }

    /// The standard chain
    #[must_use]
    pub fn with_defaults(key_manager: Arc<SigningKeyManager>) -> Self {
        Self::new(vec![
            Arc::new(ReferenceAccessTokenGenerator),
            Arc::new(RefreshTokenGenerator),
            Arc::new(JwtGenerator::new(key_manager)),
            Arc::new(AuthorizationCodeGenerator),
            Arc::new(DeviceCodeGenerator),
            Arc::new(UserCodeGenerator),
        ])
    }

    /// Generate with the first supporting generator
    ///
    /// # Errors
    ///
    /// Returns an error if the selected generator fails
    pub async fn try_generate(&self, context: &TokenContext<'_>) -> AppResult<Option<OAuth2Token>> {
        match self.generators.iter().find(|g| g.supports(context)) {
            Some(generator) => generator.generate(context).await,
            None => {
                debug!(token_type = ?context.token_type, "No token generator supports the request");
                Ok(None)
            }
        }
    }

    /// Generate a token that must exist
    ///
    /// # Errors
    ///
    /// Returns `server_error` if generation fails or no generator produced a token
    pub async fn generate(&self, context: &TokenContext<'_>) -> Result<OAuth2Token, OAuth2Error> {
        self.try_generate(context).await?.ok_or_else(|| {
            error!(
                client_id = %context.registered_client.client_id,
                grant_type = %context.grant_type,
                token_type = ?context.token_type,
                "No token generator produced the requested token"
            );
            OAuth2Error::server_error(&format!(
                "The token generator failed to generate the {}",
                token_label(context.token_type)
            ))
        })
    }
}

fn token_label(slot: TokenSlot) -> &'static str {
    match slot {
        TokenSlot::AuthorizationCode => "authorization code",
        TokenSlot::AccessToken => "access token",
        TokenSlot::RefreshToken => "refresh token",
        TokenSlot::IdToken => "ID token",
        TokenSlot::UserCode => "user code",
        TokenSlot::DeviceCode => "device code",
    }
}

/// Claims shared by reference and self-contained access tokens
fn access_token_claims(
    context: &TokenContext<'_>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Map<String, Value> {
    let mut claims = Map::new();
    if let Some(issuer) = context.issuer {
        claims.insert("iss".to_owned(), Value::from(issuer));
    }
    claims.insert("sub".to_owned(), Value::from(context.principal.name.as_str()));
    claims.insert(
        "aud".to_owned(),
        json!([context.registered_client.client_id]),
    );
    claims.insert("iat".to_owned(), Value::from(issued_at.timestamp()));
    claims.insert("exp".to_owned(), Value::from(expires_at.timestamp()));
    claims.insert("nbf".to_owned(), Value::from(issued_at.timestamp()));
    claims.insert("jti".to_owned(), Value::from(Uuid::new_v4().to_string()));
    if !context.authorized_scopes.is_empty() {
        claims.insert("scope".to_owned(), json!(context.authorized_scopes));
    }
    claims
}

fn bearer_token(
    value: String,
    context: &TokenContext<'_>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    claims: Map<String, Value>,
) -> OAuth2Token {
    let mut token = OAuth2Token::new(value, issued_at, Some(expires_at)).with_claims(claims);
    token.scopes = context.authorized_scopes.clone(); // Safe: token owns its scopes
    token.token_type = Some(BEARER_TOKEN_TYPE.to_owned());
    token
}

/// Opaque access tokens whose claims live only in the authorization store
pub struct ReferenceAccessTokenGenerator;

#[async_trait]
impl OAuth2TokenGenerator for ReferenceAccessTokenGenerator {
    fn supports(&self, context: &TokenContext<'_>) -> bool {
        context.token_type == TokenSlot::AccessToken
            && context.registered_client.token_settings.access_token_format == TokenFormat::Reference
    }

    async fn generate(&self, context: &TokenContext<'_>) -> AppResult<Option<OAuth2Token>> {
        let issued_at = Utc::now();
        let expires_at =
            issued_at + context.registered_client.token_settings.access_token_time_to_live;
        let claims = access_token_claims(context, issued_at, expires_at);
        let value = Uuid::new_v4().to_string().to_lowercase();
        Ok(Some(bearer_token(value, context, issued_at, expires_at, claims)))
    }
}

/// Opaque refresh tokens for confidential clients allowed to refresh
pub struct RefreshTokenGenerator;

#[async_trait]
impl OAuth2TokenGenerator for RefreshTokenGenerator {
    fn supports(&self, context: &TokenContext<'_>) -> bool {
        context.token_type == TokenSlot::RefreshToken
    }

    async fn generate(&self, context: &TokenContext<'_>) -> AppResult<Option<OAuth2Token>> {
        let client = context.registered_client;
        if client.is_public() || !client.allows_grant_type(&AuthorizationGrantType::RefreshToken) {
            return Ok(None);
        }
        let issued_at = Utc::now();
        let expires_at = issued_at + client.token_settings.refresh_token_time_to_live;
        Ok(Some(OAuth2Token::new(
            Uuid::new_v4().to_string().to_lowercase(),
            issued_at,
            Some(expires_at),
        )))
    }
}

/// Signed JWT access tokens and OIDC ID tokens
pub struct JwtGenerator {
    key_manager: Arc<SigningKeyManager>,
}

impl JwtGenerator {
    /// Create a generator signing with the managed key
    #[must_use]
    pub fn new(key_manager: Arc<SigningKeyManager>) -> Self {
        Self { key_manager }
    }

    fn id_token_claims(
        context: &TokenContext<'_>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Map<String, Value> {
        let client_id = context.registered_client.client_id.as_str();
        let mut claims = Map::new();
        if let Some(issuer) = context.issuer {
            claims.insert("iss".to_owned(), Value::from(issuer));
        }
        claims.insert("sub".to_owned(), Value::from(context.principal.name.as_str()));
        claims.insert("aud".to_owned(), json!([client_id]));
        claims.insert("iat".to_owned(), Value::from(issued_at.timestamp()));
        claims.insert("exp".to_owned(), Value::from(expires_at.timestamp()));
        claims.insert("azp".to_owned(), Value::from(client_id));
        claims.insert("auth_time".to_owned(), Value::from(issued_at.timestamp()));

        if let Some(authorization) = context.authorization {
            claims.insert("sid".to_owned(), Value::from(authorization.id.as_str()));
            let nonce = authorization
                .attributes
                .get(AUTHORIZATION_REQUEST_ATTRIBUTE)
                .and_then(|request| request.get("nonce"))
                .and_then(Value::as_str);
            if let Some(nonce) = nonce {
                claims.insert("nonce".to_owned(), Value::from(nonce));
            }
        }
        claims
    }
}

#[async_trait]
impl OAuth2TokenGenerator for JwtGenerator {
    fn supports(&self, context: &TokenContext<'_>) -> bool {
        match context.token_type {
            TokenSlot::AccessToken => {
                context.registered_client.token_settings.access_token_format
                    == TokenFormat::SelfContained
            }
            TokenSlot::IdToken => true,
            _ => false,
        }
    }

    async fn generate(&self, context: &TokenContext<'_>) -> AppResult<Option<OAuth2Token>> {
        let key_set = self.key_manager.signing_key_set().await?;
        let settings = &context.registered_client.token_settings;
        let issued_at = Utc::now();

        if context.token_type == TokenSlot::IdToken {
            let expires_at = issued_at + Duration::minutes(ID_TOKEN_TTL_MINUTES);
            let claims = Self::id_token_claims(context, issued_at, expires_at);
            let jws = key_set.sign(settings.id_token_signature_algorithm, &claims)?;
            return Ok(Some(
                OAuth2Token::new(jws, issued_at, Some(expires_at)).with_claims(claims),
            ));
        }

        let expires_at = issued_at + settings.access_token_time_to_live;
        let mut claims = access_token_claims(context, issued_at, expires_at);
        if context.principal.is_user() {
            claims.insert(
                AUTHORITIES_CLAIM.to_owned(),
                json!(context.principal.authorities),
            );
        }
        let jws = key_set.sign(key_set.algorithm(), &claims)?;
        Ok(Some(bearer_token(jws, context, issued_at, expires_at, claims)))
    }
}

/// Random base64url value backed by `CODE_BYTES` bytes of entropy
pub(crate) fn random_code() -> String {
    let mut bytes = [0u8; CODE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Authorization codes for the code flow
pub struct AuthorizationCodeGenerator;

#[async_trait]
impl OAuth2TokenGenerator for AuthorizationCodeGenerator {
    fn supports(&self, context: &TokenContext<'_>) -> bool {
        context.token_type == TokenSlot::AuthorizationCode
    }

    async fn generate(&self, context: &TokenContext<'_>) -> AppResult<Option<OAuth2Token>> {
        let issued_at = Utc::now();
        let ttl = context.registered_client.token_settings.authorization_code_time_to_live;
        Ok(Some(OAuth2Token::new(random_code(), issued_at, Some(issued_at + ttl))))
    }
}

/// Device codes for the device flow
pub struct DeviceCodeGenerator;

#[async_trait]
impl OAuth2TokenGenerator for DeviceCodeGenerator {
    fn supports(&self, context: &TokenContext<'_>) -> bool {
        context.token_type == TokenSlot::DeviceCode
    }

    async fn generate(&self, context: &TokenContext<'_>) -> AppResult<Option<OAuth2Token>> {
        let issued_at = Utc::now();
        let ttl = context.registered_client.token_settings.device_code_time_to_live;
        Ok(Some(OAuth2Token::new(random_code(), issued_at, Some(issued_at + ttl))))
    }
}

/// Short human-typable user codes formatted `XXXX-XXXX`
pub struct UserCodeGenerator;

impl UserCodeGenerator {
    fn user_code() -> String {
        let mut rng = OsRng;
        let mut code = String::with_capacity(USER_CODE_LENGTH + 1);
        for i in 0..USER_CODE_LENGTH {
            if i == USER_CODE_LENGTH / 2 {
                code.push('-');
            }
            let index = rng.gen_range(0..USER_CODE_ALPHABET.len());
            code.push(char::from(USER_CODE_ALPHABET[index]));
        }
        code
    }
}

#[async_trait]
impl OAuth2TokenGenerator for UserCodeGenerator {
    fn supports(&self, context: &TokenContext<'_>) -> bool {
        context.token_type == TokenSlot::UserCode
    }

    async fn generate(&self, context: &TokenContext<'_>) -> AppResult<Option<OAuth2Token>> {
        let issued_at = Utc::now();
        let ttl = context.registered_client.token_settings.user_code_time_to_live;
        Ok(Some(OAuth2Token::new(
            Self::user_code(),
            issued_at,
            Some(issued_at + ttl),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2_server::types::ClientAuthenticationMethod;

    fn reference_client() -> RegisteredClient {
        let mut client = RegisteredClient::new("democlient");
        client.token_settings.access_token_format = TokenFormat::Reference;
        client.token_settings.access_token_time_to_live = Duration::seconds(3600);
        client.client_authentication_methods =
            [ClientAuthenticationMethod::ClientSecretBasic].into();
        client.authorization_grant_types = [
            AuthorizationGrantType::Password,
            AuthorizationGrantType::RefreshToken,
        ]
        .into();
        client
    }

    fn context<'a>(
        client: &'a RegisteredClient,
        principal: &'a AuthenticatedPrincipal,
        scopes: &'a BTreeSet<String>,
        token_type: TokenSlot,
    ) -> TokenContext<'a> {
        TokenContext {
            registered_client: client,
            principal,
            authorization: None,
            authorized_scopes: scopes,
            grant_type: &AuthorizationGrantType::Password,
            token_type,
            issuer: Some("https://auth.example.com"),
        }
    }

    fn chain() -> DelegatingTokenGenerator {
        DelegatingTokenGenerator::with_defaults(Arc::new(SigningKeyManager::new(None, None)))
    }

    #[tokio::test]
    async fn test_reference_access_token_is_opaque_uuid() {
        let client = reference_client();
        let principal = AuthenticatedPrincipal::user("demo", BTreeSet::new());
        let scopes: BTreeSet<String> = ["read".to_owned()].into();

        let token = chain()
            .generate(&context(&client, &principal, &scopes, TokenSlot::AccessToken))
            .await
            .unwrap();

        assert_eq!(token.value.len(), 36);
        assert_eq!(token.value, token.value.to_lowercase());
        assert_eq!(token.expires_in(), 3600);
        assert_eq!(token.token_type.as_deref(), Some("Bearer"));
        let claims = token.claims().unwrap();
        assert_eq!(claims["sub"], "demo");
        assert_eq!(claims["aud"], json!(["democlient"]));
        assert_eq!(claims["iss"], "https://auth.example.com");
        assert_eq!(claims["scope"], json!(["read"]));
    }

    #[tokio::test]
    async fn test_refresh_token_declined_for_public_client() {
        let mut client = reference_client();
        client.client_authentication_methods = [ClientAuthenticationMethod::None].into();
        let principal = AuthenticatedPrincipal::user("demo", BTreeSet::new());
        let scopes = BTreeSet::new();

        let generated = chain()
            .try_generate(&context(&client, &principal, &scopes, TokenSlot::RefreshToken))
            .await
            .unwrap();
        assert!(generated.is_none());
    }

    #[tokio::test]
    async fn test_empty_chain_reports_server_error() {
        let client = reference_client();
        let principal = AuthenticatedPrincipal::user("demo", BTreeSet::new());
        let scopes = BTreeSet::new();

        let error = DelegatingTokenGenerator::new(Vec::new())
            .generate(&context(&client, &principal, &scopes, TokenSlot::AccessToken))
            .await
            .unwrap_err();
        assert_eq!(error.error, "server_error");
    }

    #[tokio::test]
    async fn test_first_supporting_generator_wins() {
        struct Fixed(&'static str);

        #[async_trait]
        impl OAuth2TokenGenerator for Fixed {
            fn supports(&self, _context: &TokenContext<'_>) -> bool {
                true
            }

            async fn generate(&self, _context: &TokenContext<'_>) -> AppResult<Option<OAuth2Token>> {
                Ok(Some(OAuth2Token::new(self.0, Utc::now(), None)))
            }
        }

        let client = reference_client();
        let principal = AuthenticatedPrincipal::user("demo", BTreeSet::new());
        let scopes = BTreeSet::new();
        let chain = DelegatingTokenGenerator::new(vec![
            Arc::new(Fixed("first")),
            Arc::new(Fixed("second")),
        ]);

        let token = chain
            .generate(&context(&client, &principal, &scopes, TokenSlot::AccessToken))
            .await
            .unwrap();
        assert_eq!(token.value, "first");
    }

    #[tokio::test]
    async fn test_codes_have_expected_shape() {
        let client = reference_client();
        let principal = AuthenticatedPrincipal::user("demo", BTreeSet::new());
        let scopes = BTreeSet::new();
        let chain = chain();

        let code = chain
            .generate(&context(&client, &principal, &scopes, TokenSlot::AuthorizationCode))
            .await
            .unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(&code.value).unwrap().len(), CODE_BYTES);

        let user_code = chain
            .generate(&context(&client, &principal, &scopes, TokenSlot::UserCode))
            .await
            .unwrap();
        let (left, right) = user_code.value.split_once('-').unwrap();
        assert_eq!(left.len(), 4);
        assert_eq!(right.len(), 4);
        assert!(left
            .chars()
            .chain(right.chars())
            .all(|c| USER_CODE_ALPHABET.contains(&(c as u8))));
    }
}
