// ABOUTME: Route module organization for the authorization server HTTP endpoints
// ABOUTME: OAuth2 protocol endpoints, bearer-protected token routes and health checks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! HTTP routes, one module per domain

/// Health check and readiness routes
pub mod health;
/// OAuth 2.0 protocol endpoints
pub mod oauth2;
/// Bearer-protected token holder routes
pub mod token;

pub use health::HealthRoutes;
pub use oauth2::OAuth2Routes;
pub use token::TokenRoutes;
