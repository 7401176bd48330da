//! Client configuration.
//!
//! All durations are expressed in milliseconds so a config can be loaded from
//! JSON or TOML without custom duration parsing.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::http::Headers;

/// Default per-call hard timeout (30 s).
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default cache TTL (5 min).
pub const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1000;

/// Default deduplication window (1 s).
pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 1_000;

/// Largest response the built-in transport will buffer (8 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

const ENV_BASE_URL: &str = "FETCHKIT_BASE_URL";
const ENV_TIMEOUT_MS: &str = "FETCHKIT_TIMEOUT_MS";
const ENV_CACHE_TTL_MS: &str = "FETCHKIT_CACHE_TTL_MS";
const ENV_DEDUP_WINDOW_MS: &str = "FETCHKIT_DEDUP_WINDOW_MS";

/// Settings for an [`ApiClient`](crate::ApiClient).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fetchkit::ClientConfig;
///
/// let config: ClientConfig =
///     serde_json::from_str(r#"{"base_url": "http://localhost:5000", "timeout_ms": 5000}"#).unwrap();
///
/// assert_eq!(config.timeout(), Duration::from_secs(5));
/// assert_eq!(config.cache_ttl(), Duration::from_secs(300));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that relative resources are joined onto.
    pub base_url: String,
    pub timeout_ms: u64,
    /// TTL applied to cached responses when a call does not set its own.
    pub cache_ttl_ms: u64,
    pub dedup_window_ms: u64,
    pub max_response_bytes: usize,
    /// Headers attached to every request unless the request sets them itself.
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_owned(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            dedup_window_ms: DEFAULT_DEDUP_WINDOW_MS,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            default_headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    /// Config with the given base URL and default everything else.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Reads `FETCHKIT_BASE_URL`, `FETCHKIT_TIMEOUT_MS`, `FETCHKIT_CACHE_TTL_MS`
    /// and `FETCHKIT_DEDUP_WINDOW_MS`, falling back to defaults for anything
    /// unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var(ENV_BASE_URL).unwrap_or(defaults.base_url),
            timeout_ms: env_millis(ENV_TIMEOUT_MS).unwrap_or(defaults.timeout_ms),
            cache_ttl_ms: env_millis(ENV_CACHE_TTL_MS).unwrap_or(defaults.cache_ttl_ms),
            dedup_window_ms: env_millis(ENV_DEDUP_WINDOW_MS).unwrap_or(defaults.dedup_window_ms),
            ..defaults
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = millis(timeout);
        self
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = millis(ttl);
        self
    }

    #[must_use]
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window_ms = millis(window);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn headers(&self) -> Headers {
        self.default_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn env_millis(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(ms) => Some(ms),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring non-numeric duration");
            None
        }
    }
}
