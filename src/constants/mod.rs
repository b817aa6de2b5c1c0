// ABOUTME: Application constants grouped by concern
// ABOUTME: OAuth2 protocol names, metadata keys, and service identifiers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Application constants

/// OAuth2 protocol parameter names, metadata keys and defaults
pub mod oauth2;

/// Service names used in structured logs
pub mod service_names {
    /// Authorization server service name
    pub const AUTHZ_SERVER: &str = "authz-server";
}

/// Environment variable names read by the configuration layer
pub mod env_keys {
    /// HTTP listen port
    pub const HTTP_PORT: &str = "HTTP_PORT";
    /// Database connection URL
    pub const DATABASE_URL: &str = "DATABASE_URL";
    /// Comma separated allowed CORS origins
    pub const CORS_ALLOWED_ORIGINS: &str = "CORS_ALLOWED_ORIGINS";
    /// Issuer URL placed in the `iss` claim
    pub const OAUTH2_ISSUER_URL: &str = "OAUTH2_ISSUER_URL";
    /// Comma separated glob patterns that bypass bearer authentication
    pub const OAUTH2_IGNORE_URLS: &str = "OAUTH2_IGNORE_URLS";
    /// Form parameter carrying the username in the password grant
    pub const OAUTH2_USERNAME_PARAMETER_NAME: &str = "OAUTH2_USERNAME_PARAMETER_NAME";
    /// Form parameter carrying the password in the password grant
    pub const OAUTH2_PASSWORD_PARAMETER_NAME: &str = "OAUTH2_PASSWORD_PARAMETER_NAME";
    /// PEM public key location
    pub const OAUTH2_JWT_PUBLIC_KEY_LOCATION: &str = "OAUTH2_JWT_PUBLIC_KEY_LOCATION";
    /// PEM private key location
    pub const OAUTH2_JWT_PRIVATE_KEY_LOCATION: &str = "OAUTH2_JWT_PRIVATE_KEY_LOCATION";
    /// Verification URI returned by the device authorization endpoint
    pub const OAUTH2_DEVICE_VERIFICATION_URI: &str = "OAUTH2_DEVICE_VERIFICATION_URI";
    /// Log filter directives
    pub const RUST_LOG: &str = "RUST_LOG";
    /// Log output format: `json`, `pretty` or `compact`
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
    /// Deployment environment name
    pub const ENVIRONMENT: &str = "ENVIRONMENT";
    /// Include source locations in log lines when set
    pub const LOG_INCLUDE_LOCATION: &str = "LOG_INCLUDE_LOCATION";
    /// Include thread ids and names in log lines when set
    pub const LOG_INCLUDE_THREAD: &str = "LOG_INCLUDE_THREAD";
    /// Service name attached to the startup log line
    pub const SERVICE_NAME: &str = "SERVICE_NAME";
}
