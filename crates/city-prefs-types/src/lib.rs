//! Shared API Types for city-prefs
//!
//! This crate is the SINGLE SOURCE OF TRUTH for all types crossing the HTTP
//! boundary between the city backend and the picker client.
//!
//! ## Boundaries
//!
//! ```text
//! ┌──────────────────┐         ┌──────────────────┐
//! │  City backend    │  JSON   │  Picker client   │
//! │  (/cities, ...)  │ ◄─────► │  (city-prefs)    │
//! └──────────────────┘         └──────────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. All wire types live here - no inline struct definitions in the client
//! 2. Every list-shaped response is `{data, total}` or the error envelope
//! 3. City ids are numbers on the wire and strings when used as object keys;
//!    a numeric string is accepted wherever a number is expected

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Stable identifier of a city (GeoNames id on the reference backend).
///
/// Ids are numeric. Backends that quote them (`"2643743"`) are accepted;
/// a non-numeric id is a decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CityId(pub u64);

impl<'de> Deserialize<'de> for CityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(raw) => Ok(CityId(raw)),
            Raw::Text(text) => text.parse().map_err(|_| {
                serde::de::Error::custom(format!("city id '{}' is not numeric", text))
            }),
        }
    }
}

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(CityId)
    }
}

impl From<u64> for CityId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// ============================================================================
// CITY API
// ============================================================================

/// A single city row as returned by `/cities` and `/city/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub id: CityId,
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
}

impl City {
    /// Label used in chips and notifications
    pub fn label(&self) -> &str {
        &self.name
    }
}

/// One page of a server-paginated collection.
///
/// `total` is the size of the whole collection for the current query,
/// not the length of `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub total: u64,
}

// ============================================================================
// PREFERENCES API
// ============================================================================

/// PATCH body for `/preferences/cities`: `{"<id>": <enabled>}`.
///
/// Serialized as a plain JSON object keyed by the decimal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreferencePatch(pub std::collections::BTreeMap<String, bool>);

impl PreferencePatch {
    pub fn single(id: CityId, enabled: bool) -> Self {
        let mut map = std::collections::BTreeMap::new();
        map.insert(id.to_string(), enabled);
        Self(map)
    }
}

// ============================================================================
// ERROR ENVELOPE
// ============================================================================

/// Error payload any endpoint may answer with: `{"error": true, "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: bool,
    #[serde(default)]
    pub message: String,
}

impl ApiErrorBody {
    /// Extract the error envelope from a raw JSON value.
    ///
    /// Returns `None` unless `error` is present and truthy, so a body like
    /// `{"error": false, ...}` is treated as a regular payload.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let flagged = match obj.get("error")? {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::Null => false,
            serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            serde_json::Value::String(s) => !s.is_empty(),
            _ => true,
        };
        if !flagged {
            return None;
        }
        let message = obj
            .get("message")
            .map(|m| match m {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        Some(Self {
            error: true,
            message,
        })
    }
}
