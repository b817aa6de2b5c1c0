// ABOUTME: Glob-based list of request paths that bypass bearer authentication
// ABOUTME: Match decisions are memoized per path in a bounded LRU cache
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::num::NonZeroUsize;
use std::sync::Mutex;

use glob::{MatchOptions, Pattern};
use lru::LruCache;
use tracing::debug;

use crate::constants::oauth2::IGNORE_URL_CACHE_CAPACITY;
use crate::errors::{AppError, AppResult};

/// `*` stays within one path segment; `**` spans segments
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Decides whether a request path skips authentication
pub struct UrlIgnoreCache {
    patterns: Vec<Pattern>,
    decisions: Mutex<LruCache<String, bool>>,
}

impl UrlIgnoreCache {
    /// Fallback capacity if the configured one is zero
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(IGNORE_URL_CACHE_CAPACITY) {
        Some(n) => n,
        None => NonZeroUsize::MIN,
    };

    /// Compile the configured patterns
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed glob
    pub fn new(patterns: &[String]) -> AppResult<Self> {
        let patterns = patterns
            .iter()
            .map(|raw| {
                Pattern::new(raw).map_err(|e| {
                    AppError::config(format!("Invalid ignore URL pattern '{raw}': {e}"))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            patterns,
            decisions: Mutex::new(LruCache::new(Self::DEFAULT_CAPACITY)),
        })
    }

    /// Whether requests to `path` skip bearer authentication
    pub fn is_ignored(&self, path: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }

        if let Ok(mut decisions) = self.decisions.lock() {
            if let Some(ignored) = decisions.get(path) {
                return *ignored;
            }
            let ignored = self.evaluate(path);
            decisions.put(path.to_owned(), ignored);
            return ignored;
        }
        self.evaluate(path)
    }

    fn evaluate(&self, path: &str) -> bool {
        let ignored = self
            .patterns
            .iter()
            .any(|pattern| pattern.matches_with(path, MATCH_OPTIONS));
        debug!(path, ignored, "Evaluated ignore URL patterns");
        ignored
    }

    /// Number of memoized decisions
    #[must_use]
    pub fn cached_decisions(&self) -> usize {
        self.decisions.lock().map_or(0, |decisions| decisions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(patterns: &[&str]) -> UrlIgnoreCache {
        UrlIgnoreCache::new(&patterns.iter().map(|p| (*p).to_owned()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_single_and_double_star() {
        let cache = cache(&["/public/*", "/docs/**"]);
        assert!(cache.is_ignored("/public/logo.png"));
        assert!(!cache.is_ignored("/public/img/logo.png"));
        assert!(cache.is_ignored("/docs/api/v1/index.html"));
        assert!(!cache.is_ignored("/token/info"));
    }

    #[test]
    fn test_decisions_are_memoized() {
        let cache = cache(&["/health"]);
        assert!(cache.is_ignored("/health"));
        assert!(cache.is_ignored("/health"));
        assert!(!cache.is_ignored("/token/info"));
        assert_eq!(cache.cached_decisions(), 2);
    }

    #[test]
    fn test_no_patterns_ignore_nothing() {
        let cache = cache(&[]);
        assert!(!cache.is_ignored("/anything"));
        assert_eq!(cache.cached_decisions(), 0);
    }

    #[test]
    fn test_malformed_pattern_is_config_error() {
        assert!(UrlIgnoreCache::new(&["/a/[".to_owned()]).is_err());
    }
}
