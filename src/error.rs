//! Error types for the fetch pipeline
//!
//! Every failure the client can produce is a `FetchError`. `Cancelled` is
//! special: it marks a request that was superseded by a newer one and must
//! never reach the user.

use city_prefs_types::CityId;
use thiserror::Error;

/// Failure of a single backend interaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network, DNS or HTTP-status failure without a readable error body
    #[error("Network error: {0}")]
    Transport(String),

    /// The request was aborted because a newer one replaced it
    #[error("Request cancelled")]
    Cancelled,

    /// Well-formed `{error: true, message}` payload from the server
    #[error("{0}")]
    Api(String),

    /// Body was valid transport-wise but not the JSON shape we expect
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Name resolution gave up after the retry bound
    #[error("Could not load city {id} after {attempts} attempts: {last}")]
    RetryExhausted {
        id: CityId,
        attempts: u32,
        last: String,
    },
}

impl FetchError {
    /// Superseded requests are swallowed silently by the controller
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

impl From<futures::future::Aborted> for FetchError {
    fn from(_: futures::future::Aborted) -> Self {
        FetchError::Cancelled
    }
}

/// Configuration loading / validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid base URL '{url}': {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Page size must be positive")]
    ZeroLimit,

    #[error("Invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;
