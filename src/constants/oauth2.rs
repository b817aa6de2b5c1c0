// ABOUTME: OAuth2 and OIDC protocol constants
// ABOUTME: Parameter names, token metadata keys, attribute keys and lifetime defaults
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Standard request parameter names (RFC 6749, RFC 7636, RFC 8628)
pub mod params {
    /// `grant_type`
    pub const GRANT_TYPE: &str = "grant_type";
    /// `scope`
    pub const SCOPE: &str = "scope";
    /// `client_id`
    pub const CLIENT_ID: &str = "client_id";
    /// `client_secret`
    pub const CLIENT_SECRET: &str = "client_secret";
    /// `code`
    pub const CODE: &str = "code";
    /// `redirect_uri`
    pub const REDIRECT_URI: &str = "redirect_uri";
    /// `refresh_token`
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// `code_verifier`
    pub const CODE_VERIFIER: &str = "code_verifier";
    /// `device_code`
    pub const DEVICE_CODE: &str = "device_code";
    /// `token`
    pub const TOKEN: &str = "token";
    /// `token_type_hint`
    pub const TOKEN_TYPE_HINT: &str = "token_type_hint";
    /// `id_token` response parameter
    pub const ID_TOKEN: &str = "id_token";
}

/// The OpenID scope that triggers ID token issuance
pub const OPENID_SCOPE: &str = "openid";

/// Token type returned for access tokens
pub const BEARER_TOKEN_TYPE: &str = "Bearer";

/// Default username form parameter for the password grant
pub const DEFAULT_USERNAME_PARAMETER: &str = "username";

/// Default password form parameter for the password grant
pub const DEFAULT_PASSWORD_PARAMETER: &str = "password";

/// Token metadata key holding the claims of a token
pub const CLAIMS_METADATA_KEY: &str = "metadata.token.claims";

/// Token metadata key marking a token as invalidated
pub const INVALIDATED_METADATA_KEY: &str = "metadata.token.invalidated";

/// Authorization attribute holding the serialized authenticated principal
pub const PRINCIPAL_ATTRIBUTE: &str = "principal";

/// Authorization attribute holding the `state` of an authorization request
pub const STATE_ATTRIBUTE: &str = "state";

/// Authorization attribute holding the original authorization request
pub const AUTHORIZATION_REQUEST_ATTRIBUTE: &str = "authorization_request";

/// Authorization attribute holding non-reserved token request parameters
pub const ADDITIONAL_PARAMETERS_ATTRIBUTE: &str = "additional_parameters";

/// Authorization attribute recording a denied device authorization
pub const DEVICE_DENIED_ATTRIBUTE: &str = "device_authorization_denied";

/// Authorization attribute holding the last device token poll (epoch seconds)
pub const DEVICE_LAST_POLLED_ATTRIBUTE: &str = "device_last_polled_at";

/// Principal attribute carrying the username
pub const USERNAME_ATTRIBUTE: &str = "username";

/// Principal attribute and JWT claim carrying granted authorities
pub const AUTHORITIES_CLAIM: &str = "authorities";

/// ID token lifetime in minutes
pub const ID_TOKEN_TTL_MINUTES: i64 = 30;

/// Minimum polling interval for the device flow, in seconds
pub const DEVICE_POLL_INTERVAL_SECS: i64 = 5;

/// Random bytes backing authorization and device codes
pub const CODE_BYTES: usize = 96;

/// Alphabet for user codes (no vowels, avoids ambiguous words)
pub const USER_CODE_ALPHABET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";

/// Length of a user code before formatting
pub const USER_CODE_LENGTH: usize = 8;

/// Minimum RSA modulus size in bits accepted for signing keys
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Capacity of the ignored-URL decision cache
pub const IGNORE_URL_CACHE_CAPACITY: usize = 1024;

/// RFC reference pages attached to protocol errors
pub mod error_uris {
    /// RFC 6749 section 5.2 (token endpoint errors)
    pub const TOKEN_ENDPOINT: &str = "https://datatracker.ietf.org/doc/html/rfc6749#section-5.2";
    /// RFC 6749 section 4.1.2.1 (authorization endpoint errors)
    pub const AUTHORIZATION_ENDPOINT: &str =
        "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1";
    /// RFC 8628 section 3.5 (device access token errors)
    pub const DEVICE_TOKEN: &str = "https://datatracker.ietf.org/doc/html/rfc8628#section-3.5";
}
