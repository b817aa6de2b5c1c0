// ABOUTME: OAuth2 vocabulary types: grant types, client auth methods, token types and formats
// ABOUTME: Open-ended enums keep unknown wire values as Custom variants that round-trip unchanged
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Wire vocabulary shared by client registrations, authorizations and requests.
//!
//! Grant types and client authentication methods are open sets: a value the
//! server does not know is kept as `Custom(value)` instead of being rejected,
//! so a registration can carry e.g. an extension grant without schema changes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Defines an open vocabulary enum with a `Custom(String)` fallback.
macro_rules! open_vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// Any value outside the known vocabulary
            Custom(String),
        }

        impl $name {
            /// Wire representation
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $wire, )+
                    Self::Custom(value) => value,
                }
            }

            /// Whether this value fell outside the known vocabulary
            #[must_use]
            pub const fn is_custom(&self) -> bool {
                matches!(self, Self::Custom(_))
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                match value {
                    $( $wire => Self::$variant, )+
                    other => Self::Custom(other.to_owned()),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::from(value.as_str())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                match value {
                    $name::Custom(value) => value,
                    known => known.as_str().to_owned(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

open_vocabulary! {
    /// OAuth2 authorization grant type
    AuthorizationGrantType {
        /// RFC 6749 authorization code grant
        AuthorizationCode => "authorization_code",
        /// RFC 6749 client credentials grant
        ClientCredentials => "client_credentials",
        /// RFC 6749 refresh token grant
        RefreshToken => "refresh_token",
        /// RFC 8628 device authorization grant
        DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
        /// Resource owner password credentials grant
        Password => "password",
        /// RFC 7523 JWT bearer grant
        JwtBearer => "urn:ietf:params:oauth:grant-type:jwt-bearer",
        /// RFC 8693 token exchange
        TokenExchange => "urn:ietf:params:oauth:grant-type:token-exchange",
    }
}

open_vocabulary! {
    /// Method a client uses to authenticate at the token endpoint
    ClientAuthenticationMethod {
        /// HTTP Basic with client id and secret
        ClientSecretBasic => "client_secret_basic",
        /// Client id and secret as form parameters
        ClientSecretPost => "client_secret_post",
        /// HMAC-signed JWT assertion
        ClientSecretJwt => "client_secret_jwt",
        /// Private-key-signed JWT assertion
        PrivateKeyJwt => "private_key_jwt",
        /// Public client, no secret
        None => "none",
        /// Mutual TLS with a CA-issued certificate
        TlsClientAuth => "tls_client_auth",
        /// Mutual TLS with a self-signed certificate
        SelfSignedTlsClientAuth => "self_signed_tls_client_auth",
    }
}

/// A token-bearing slot of an authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSlot {
    /// Authorization code
    AuthorizationCode,
    /// Access token
    AccessToken,
    /// Refresh token
    RefreshToken,
    /// OIDC ID token
    IdToken,
    /// Device flow user code
    UserCode,
    /// Device flow device code
    DeviceCode,
}

impl TokenSlot {
    /// All token slots
    pub const ALL: [Self; 6] = [
        Self::AuthorizationCode,
        Self::AccessToken,
        Self::RefreshToken,
        Self::IdToken,
        Self::UserCode,
        Self::DeviceCode,
    ];
}

/// Lookup key for `find_by_token`: any token slot or the authorization `state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuth2TokenType {
    /// `state` parameter of an authorization request
    State,
    /// One of the token slots
    Token(TokenSlot),
}

impl OAuth2TokenType {
    /// Access token lookup
    pub const ACCESS_TOKEN: Self = Self::Token(TokenSlot::AccessToken);
    /// Refresh token lookup
    pub const REFRESH_TOKEN: Self = Self::Token(TokenSlot::RefreshToken);
    /// Authorization code lookup
    pub const AUTHORIZATION_CODE: Self = Self::Token(TokenSlot::AuthorizationCode);
    /// ID token lookup
    pub const ID_TOKEN: Self = Self::Token(TokenSlot::IdToken);
    /// User code lookup
    pub const USER_CODE: Self = Self::Token(TokenSlot::UserCode);
    /// Device code lookup
    pub const DEVICE_CODE: Self = Self::Token(TokenSlot::DeviceCode);

    /// Precedence used when `find_by_token` is called without a hint
    pub const LOOKUP_PRECEDENCE: [Self; 7] = [
        Self::State,
        Self::AUTHORIZATION_CODE,
        Self::ACCESS_TOKEN,
        Self::REFRESH_TOKEN,
        Self::ID_TOKEN,
        Self::USER_CODE,
        Self::DEVICE_CODE,
    ];

    /// Parse a `token_type_hint` value; unknown hints yield `None`
    #[must_use]
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint {
            "state" => Some(Self::State),
            "code" => Some(Self::AUTHORIZATION_CODE),
            "access_token" => Some(Self::ACCESS_TOKEN),
            "refresh_token" => Some(Self::REFRESH_TOKEN),
            "id_token" => Some(Self::ID_TOKEN),
            "user_code" => Some(Self::USER_CODE),
            "device_code" => Some(Self::DEVICE_CODE),
            _ => None,
        }
    }

    /// Wire name used as a `token_type_hint`
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Token(TokenSlot::AuthorizationCode) => "code",
            Self::Token(TokenSlot::AccessToken) => "access_token",
            Self::Token(TokenSlot::RefreshToken) => "refresh_token",
            Self::Token(TokenSlot::IdToken) => "id_token",
            Self::Token(TokenSlot::UserCode) => "user_code",
            Self::Token(TokenSlot::DeviceCode) => "device_code",
        }
    }
}

impl From<TokenSlot> for OAuth2TokenType {
    fn from(slot: TokenSlot) -> Self {
        Self::Token(slot)
    }
}

/// Access token format configured per client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TokenFormat {
    /// Signed JWT carrying its own claims
    #[default]
    #[serde(rename = "self-contained")]
    SelfContained,
    /// Opaque value resolved through introspection
    #[serde(rename = "reference")]
    Reference,
}

impl TokenFormat {
    /// Wire representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SelfContained => "self-contained",
            Self::Reference => "reference",
        }
    }

    /// Parse a stored format name
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "self-contained" | "self_contained" => Some(Self::SelfContained),
            "reference" => Some(Self::Reference),
            _ => None,
        }
    }
}

/// JWS signature algorithm names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 using SHA-256
    #[default]
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512
    RS512,
    /// RSASSA-PSS using SHA-256
    PS256,
    /// RSASSA-PSS using SHA-384
    PS384,
    /// RSASSA-PSS using SHA-512
    PS512,
    /// ECDSA using P-256
    ES256,
    /// ECDSA using P-384
    ES384,
    /// HMAC using SHA-256
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
}

impl SignatureAlgorithm {
    /// Wire representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
        }
    }

    /// Parse an algorithm name
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.trim().to_uppercase().as_str() {
            "RS256" => Self::RS256,
            "RS384" => Self::RS384,
            "RS512" => Self::RS512,
            "PS256" => Self::PS256,
            "PS384" => Self::PS384,
            "PS512" => Self::PS512,
            "ES256" => Self::ES256,
            "ES384" => Self::ES384,
            "HS256" => Self::HS256,
            "HS384" => Self::HS384,
            "HS512" => Self::HS512,
            _ => return None,
        })
    }

    /// Whether this algorithm can be produced with an RSA signing key
    #[must_use]
    pub const fn is_rsa(&self) -> bool {
        matches!(
            self,
            Self::RS256 | Self::RS384 | Self::RS512 | Self::PS256 | Self::PS384 | Self::PS512
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_grant_types_resolve_to_variants() {
        assert_eq!(
            AuthorizationGrantType::from("password"),
            AuthorizationGrantType::Password
        );
        assert_eq!(
            AuthorizationGrantType::from("urn:ietf:params:oauth:grant-type:device_code"),
            AuthorizationGrantType::DeviceCode
        );
    }

    #[test]
    fn test_unknown_values_round_trip_as_custom() {
        let grant = AuthorizationGrantType::from("urn:example:sms_otp");
        assert!(grant.is_custom());
        assert_eq!(grant.as_str(), "urn:example:sms_otp");

        let json = serde_json::to_string(&grant).unwrap();
        assert_eq!(json, "\"urn:example:sms_otp\"");
        let back: AuthorizationGrantType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, grant);

        let method = ClientAuthenticationMethod::from("mtls_custom");
        assert_eq!(String::from(method), "mtls_custom");
    }

    #[test]
    fn test_lookup_precedence_order() {
        let names: Vec<&str> = OAuth2TokenType::LOOKUP_PRECEDENCE
            .iter()
            .map(OAuth2TokenType::as_str)
            .collect();
        assert_eq!(
            names,
            vec![
                "state",
                "code",
                "access_token",
                "refresh_token",
                "id_token",
                "user_code",
                "device_code"
            ]
        );
    }

    #[test]
    fn test_token_type_hints() {
        assert_eq!(
            OAuth2TokenType::from_hint("refresh_token"),
            Some(OAuth2TokenType::REFRESH_TOKEN)
        );
        assert_eq!(OAuth2TokenType::from_hint("bogus"), None);
    }

    #[test]
    fn test_token_format_parsing() {
        assert_eq!(TokenFormat::parse("reference"), Some(TokenFormat::Reference));
        assert_eq!(
            TokenFormat::parse("self-contained"),
            Some(TokenFormat::SelfContained)
        );
        assert_eq!(TokenFormat::parse("opaque"), None);
    }

    #[test]
    fn test_signature_algorithm_family() {
        assert!(SignatureAlgorithm::PS384.is_rsa());
        assert!(!SignatureAlgorithm::ES256.is_rsa());
        assert_eq!(SignatureAlgorithm::parse("rs512"), Some(SignatureAlgorithm::RS512));
    }
}
