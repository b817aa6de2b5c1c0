// ABOUTME: Configuration management module for server and OAuth2 settings
// ABOUTME: Environment-only configuration surface for the authorization server
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Configuration module
//!
//! Everything process-wide is read from environment variables. Per-client
//! token settings live in the registered client store instead.

/// Environment and server configuration
pub mod environment;

pub use environment::{DatabaseUrl, OAuth2Settings, ServerConfig};
