//! Client configuration
//!
//! Loads `ApiConfig` from defaults, YAML, or `CITY_PREFS_*` environment
//! variables. Every field has a default so partial sources are fine.

use crate::error::ConfigError;
use city_prefs_types::CityId;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

const DEFAULT_BASE_URL: &str = "http://localhost:3030";
const DEFAULT_LIMIT: u64 = 20;
const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_RESOLVE_RETRIES: u32 = 5;

/// Backend endpoints and client tuning
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Paged, filterable city list
    pub list_endpoint: String,
    /// Single city lookup, `:id` is substituted
    pub single_endpoint: String,
    /// Paged preference ids (GET) and preference mutation (PATCH)
    pub prefs_endpoint: String,
    /// Page size shared by every paged endpoint
    pub limit: u64,
    /// Quiet window for filter input coalescing
    pub debounce_ms: u64,
    /// Extra attempts after the first failed single-city lookup
    pub resolve_retries: u32,
    /// Transport-level timeout; `0` disables it
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            list_endpoint: "/cities".to_string(),
            single_endpoint: "/city/:id".to_string(),
            prefs_endpoint: "/preferences/cities".to_string(),
            limit: DEFAULT_LIMIT,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            resolve_retries: DEFAULT_RESOLVE_RETRIES,
            request_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    /// Defaults with a different backend
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Defaults overridden by `CITY_PREFS_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = lookup("CITY_PREFS_BASE_URL") {
            config.base_url = v;
        }
        if let Some(v) = lookup("CITY_PREFS_LIST_ENDPOINT") {
            config.list_endpoint = v;
        }
        if let Some(v) = lookup("CITY_PREFS_SINGLE_ENDPOINT") {
            config.single_endpoint = v;
        }
        if let Some(v) = lookup("CITY_PREFS_PREFS_ENDPOINT") {
            config.prefs_endpoint = v;
        }
        if let Some(v) = lookup("CITY_PREFS_LIMIT") {
            config.limit = parse_env("CITY_PREFS_LIMIT", &v)?;
        }
        if let Some(v) = lookup("CITY_PREFS_DEBOUNCE_MS") {
            config.debounce_ms = parse_env("CITY_PREFS_DEBOUNCE_MS", &v)?;
        }
        if let Some(v) = lookup("CITY_PREFS_RESOLVE_RETRIES") {
            config.resolve_retries = parse_env("CITY_PREFS_RESOLVE_RETRIES", &v)?;
        }
        if let Some(v) = lookup("CITY_PREFS_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_env("CITY_PREFS_TIMEOUT_SECS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        self.base()?;
        Ok(())
    }

    /// Parsed base URL
    pub fn base(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|source| ConfigError::BaseUrl {
            url: self.base_url.clone(),
            source,
        })
    }

    /// Path of the single-city endpoint for `id`
    pub fn single_path(&self, id: CityId) -> String {
        self.single_endpoint.replace(":id", &id.to_string())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}
