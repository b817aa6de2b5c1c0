// ABOUTME: HTTP middleware for bearer authentication, ignored URLs and CORS
// ABOUTME: Resource routes are guarded here; OAuth2 endpoints authenticate clients themselves

pub mod bearer;
pub mod cors;
pub mod url_ignore;

pub use bearer::{bearer_token, require_bearer, BearerPrincipal};
pub use cors::setup_cors;
pub use url_ignore::UrlIgnoreCache;
