//! city-prefs - favorite-cities picker core
//!
//! Turns filter typing, scrolling and favorite toggles into a minimal,
//! race-free sequence of requests against a paged city backend.
//!
//! ## Layers
//!
//! ```text
//! FetchController ── debounce, merge, optimistic toggle
//!       │
//! PagedClient ────── Pager (cursor) + RequestGate (one in flight)
//!       │
//! Transport ──────── reqwest (HttpTransport) or a test double
//! ```

pub mod client;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod gate;
pub mod names;
pub mod pager;
pub mod sink;
pub mod transport;

pub use city_prefs_types::{City, CityId, Paged};
pub use client::{ListOutcome, PagedClient, PendingPage};
pub use config::ApiConfig;
pub use controller::{AppState, FetchController, FetchPhase};
pub use error::{ConfigError, FetchError};
pub use names::NameResolutionCache;
pub use sink::{ErrorSink, RecordingSink, Repaint};
pub use transport::{HttpTransport, Transport};
