// ABOUTME: Form-encoded OAuth2 request parameters with single-value enforcement
// ABOUTME: Parses bodies and query strings into a multi-map and extracts scopes and extras
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use super::models::OAuth2Error;
use crate::constants::oauth2::params;

/// Parameters of a form-encoded OAuth2 request
///
/// A name may repeat on the wire; protocol parameters must not, and
/// [`RequestParameters::single`] rejects repeats with `invalid_request`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParameters {
    values: BTreeMap<String, Vec<String>>,
}

impl RequestParameters {
    /// Parse an `application/x-www-form-urlencoded` body or query string
    #[must_use]
    pub fn parse(encoded: &[u8]) -> Self {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in url::form_urlencoded::parse(encoded) {
            values
                .entry(name.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        Self { values }
    }

    /// First non-empty value of a parameter
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Whether a parameter carries a non-empty value
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.first(name).is_some()
    }

    /// Optional parameter that may appear at most once
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` naming the parameter if it is repeated
    pub fn single(&self, name: &str) -> Result<Option<&str>, OAuth2Error> {
        match self.values.get(name) {
            Some(values) if values.len() > 1 => Err(invalid_parameter(name)),
            _ => Ok(self.first(name)),
        }
    }

    /// Required parameter that must appear exactly once with a value
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` naming the parameter if it is missing,
    /// empty or repeated
    pub fn required(&self, name: &str) -> Result<&str, OAuth2Error> {
        self.single(name)?.ok_or_else(|| invalid_parameter(name))
    }

    /// Space-delimited `scope`, `None` when absent
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` if `scope` is repeated
    pub fn scopes(&self) -> Result<Option<BTreeSet<String>>, OAuth2Error> {
        Ok(self.single(params::SCOPE)?.map(parse_scopes))
    }

    /// Every parameter not in `reserved`; repeated values become arrays
    #[must_use]
    pub fn additional_parameters(&self, reserved: &[&str]) -> Map<String, Value> {
        self.values
            .iter()
            .filter(|(name, _)| !reserved.contains(&name.as_str()))
            .map(|(name, values)| {
                let value = match values.as_slice() {
                    [single] => Value::from(single.as_str()),
                    many => Value::from(many.to_vec()),
                };
                (name.clone(), value) // Safe: map owns its keys
            })
            .collect()
    }
}

/// Split a space-delimited scope string
#[must_use]
pub fn parse_scopes(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(str::to_owned).collect()
}

/// Join scopes for a response `scope` field
#[must_use]
pub fn join_scopes(scopes: &BTreeSet<String>) -> Option<String> {
    if scopes.is_empty() {
        None
    } else {
        Some(scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" "))
    }
}

fn invalid_parameter(name: &str) -> OAuth2Error {
    OAuth2Error::invalid_request(&format!("OAuth 2.0 Parameter: {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rejects_missing_empty_and_repeated() {
        let parameters = RequestParameters::parse(b"username=demo&password=&scope=a&scope=b");
        assert_eq!(parameters.required("username").unwrap(), "demo");
        assert!(parameters.required("password").is_err());
        assert!(parameters.required("missing").is_err());

        let error = parameters.scopes().unwrap_err();
        assert_eq!(error.error, "invalid_request");
        assert_eq!(
            error.error_description.as_deref(),
            Some("OAuth 2.0 Parameter: scope")
        );
    }

    #[test]
    fn test_scopes_split_on_whitespace() {
        let parameters = RequestParameters::parse(b"scope=openid+profile%20read");
        let scopes = parameters.scopes().unwrap().unwrap();
        assert_eq!(scopes.len(), 3);
        assert!(scopes.contains("profile"));
        assert_eq!(join_scopes(&scopes).as_deref(), Some("openid profile read"));
        assert!(RequestParameters::default().scopes().unwrap().is_none());
    }

    #[test]
    fn test_additional_parameters_exclude_reserved() {
        let parameters =
            RequestParameters::parse(b"grant_type=password&username=u&device=tv&tag=a&tag=b");
        let extra = parameters.additional_parameters(&["grant_type", "username"]);
        assert_eq!(extra.len(), 2);
        assert_eq!(extra["device"], "tv");
        assert_eq!(extra["tag"], serde_json::json!(["a", "b"]));
    }
}
