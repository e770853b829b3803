//! Memoizing single-city lookup
//!
//! Selected ids arrive from the preferences endpoint without names. Chips
//! need a label, so each id is resolved once through `/city/:id` and kept
//! for the session. Entries are never evicted.

use crate::client::PagedClient;
use crate::error::{FetchError, Result};
use city_prefs_types::{City, CityId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub struct NameResolutionCache {
    client: Arc<PagedClient>,
    /// Extra attempts after the first failure
    max_retries: u32,
    entries: RwLock<HashMap<CityId, City>>,
}

impl NameResolutionCache {
    pub fn new(client: Arc<PagedClient>, max_retries: u32) -> Self {
        Self {
            client,
            max_retries,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached city, or a lookup retried immediately up to `max_retries` times.
    ///
    /// Concurrent resolves of the same id may both hit the network; the
    /// later write wins, which is harmless since city rows are immutable.
    pub async fn resolve(&self, id: CityId) -> Result<City> {
        if let Some(city) = self.get(id) {
            return Ok(city);
        }

        let attempts = self.max_retries + 1;
        let mut last = None;
        for attempt in 1..=attempts {
            match self.client.get_single(id).await {
                Ok(city) => {
                    self.remember(city.clone());
                    return Ok(city);
                }
                Err(e) => {
                    tracing::warn!(%id, attempt, error = %e, "city lookup failed");
                    last = Some(e);
                }
            }
        }

        Err(FetchError::RetryExhausted {
            id,
            attempts,
            last: last.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Cache peek without I/O
    pub fn get(&self, id: CityId) -> Option<City> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Store a city already known from a list page.
    pub fn remember(&self, city: City) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(city.id, city);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::transport::mock::{MockTransport, Reply};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn london() -> serde_json::Value {
        json!({"id": 2643743, "name": "London", "region": "England", "country": "GB"})
    }

    fn cache_over(transport: Arc<MockTransport>, retries: u32) -> NameResolutionCache {
        let client = PagedClient::new(transport, ApiConfig::default()).unwrap();
        NameResolutionCache::new(Arc::new(client), retries)
    }

    #[tokio::test]
    async fn test_resolve_hits_network_once() {
        let transport = Arc::new(MockTransport::new(|_| Reply::Json(london())));
        let cache = cache_over(transport.clone(), 5);

        let first = cache.resolve(CityId(2643743)).await.unwrap();
        let second = cache.resolve(CityId(2643743)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.name, "London");
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_retries_then_succeeds() {
        let failures = Arc::new(AtomicU32::new(0));
        let counter = failures.clone();
        let transport = Arc::new(MockTransport::new(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                Reply::Fail(FetchError::Transport("connection refused".into()))
            } else {
                Reply::Json(london())
            }
        }));
        let cache = cache_over(transport.clone(), 5);

        let city = cache.resolve(CityId(2643743)).await.unwrap();
        assert_eq!(city.name, "London");
        assert_eq!(transport.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_resolve_gives_up_after_bound() {
        let transport = Arc::new(MockTransport::new(|_| {
            Reply::Json(json!({"error": true, "message": "No such city"}))
        }));
        let cache = cache_over(transport.clone(), 5);

        let err = cache.resolve(CityId(7)).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::RetryExhausted {
                id: CityId(7),
                attempts: 6,
                last: "No such city".into(),
            }
        );
        assert_eq!(transport.calls().len(), 6);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_remembered_city_skips_network() {
        let transport = Arc::new(MockTransport::new(|_| Reply::Json(london())));
        let cache = cache_over(transport.clone(), 0);

        cache.remember(serde_json::from_value(london()).unwrap());
        cache.resolve(CityId(2643743)).await.unwrap();
        assert!(transport.calls().is_empty());
    }
}
