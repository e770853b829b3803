//! Paged API client
//!
//! Owns the pager and the request gate for one backend. List and
//! preference paging share the gate, so at most one paged request is ever
//! in flight; preference mutation and single lookups bypass it.

use crate::config::ApiConfig;
use crate::error::{ConfigError, FetchError, Result};
use crate::gate::{RequestGate, SessionId, SessionToken};
use crate::pager::{Pager, PagerMode};
use crate::transport::Transport;
use city_prefs_types::{ApiErrorBody, City, CityId, Paged, PreferencePatch};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

/// Result of asking for the next page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOutcome<T> {
    /// The stream is exhausted for the current filter; nothing was sent
    NotIssued,
    /// A page was fetched and accepted
    Page {
        data: Vec<T>,
        /// The page starts a new result set and replaces what was shown
        was_filter_reset: bool,
        /// No further pages exist after this one
        is_last_page: bool,
    },
}

impl<T> ListOutcome<T> {
    pub fn was_issued(&self) -> bool {
        matches!(self, ListOutcome::Page { .. })
    }
}

#[derive(Debug, Default)]
struct ClientState {
    gate: RequestGate,
    pager: Option<Pager>,
    /// Last trimmed filter the list pager ran against
    filter: String,
    /// Set by a reset or a fresh pager, consumed by the next accepted page
    needs_replace: bool,
}

impl ClientState {
    /// Active pager for `mode`, allocating a fresh one on a mode switch.
    fn pager_for(&mut self, mode: PagerMode, limit: u64) -> &mut Pager {
        if self.pager.as_ref().map(Pager::mode) != Some(mode) {
            tracing::debug!(?mode, "allocating pager");
            self.needs_replace = true;
            self.pager = Some(Pager::new(mode, limit));
        }
        self.pager.get_or_insert_with(|| Pager::new(mode, limit))
    }
}

/// Releases the session on every exit path of a paged request.
struct SessionGuard {
    state: Arc<Mutex<ClientState>>,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        lock(&self.state).gate.settle(self.id);
    }
}

fn lock(state: &Mutex<ClientState>) -> MutexGuard<'_, ClientState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A paged request that already owns its gate session but has not been
/// sent yet. Dropping it unsent releases the session.
pub struct PendingPage<T> {
    session: SessionGuard,
    token: SessionToken,
    url: Url,
    mode: PagerMode,
    _rows: PhantomData<fn() -> T>,
}

pub struct PagedClient {
    transport: Arc<dyn Transport>,
    config: ApiConfig,
    state: Arc<Mutex<ClientState>>,
}

impl PagedClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ApiConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            transport,
            config,
            state: Arc::new(Mutex::new(ClientState::default())),
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Whether the active pager has reached its last page
    pub fn is_last_page(&self) -> bool {
        lock(&self.state)
            .pager
            .as_ref()
            .is_some_and(Pager::is_last_page)
    }

    /// Whether a paged request is in flight
    pub fn is_loading(&self) -> bool {
        lock(&self.state).gate.is_busy()
    }

    /// Abort the in-flight paged request, if any.
    pub fn abort(&self) {
        lock(&self.state).gate.cancel();
    }

    // =========================================================================
    // PAGED ENDPOINTS
    // =========================================================================

    /// Next page of cities matching `filter`.
    ///
    /// A filter different from the previous call rewinds the pager, so a
    /// new filter always issues at least one request even if the old one
    /// was exhausted.
    pub async fn get_list(&self, filter: &str) -> Result<ListOutcome<City>> {
        match self.prepare_list(filter)? {
            Some(page) => self.fetch(page).await,
            None => Ok(ListOutcome::NotIssued),
        }
    }

    /// Synchronous half of `get_list`: apply the filter to the pager and
    /// claim the gate. `None` when the list is exhausted for `filter`.
    ///
    /// Sessions are ordered by the call to this method, not by when the
    /// returned page is awaited.
    pub fn prepare_list(&self, filter: &str) -> Result<Option<PendingPage<City>>> {
        let filter = filter.trim();
        let limit = self.config.limit;
        let mut url = self.endpoint(&self.config.list_endpoint)?;

        let (token, offset) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let filter_changed = state.filter != filter;
            let pager = state.pager_for(PagerMode::List, limit);
            if filter_changed {
                pager.reset();
                tracing::info!(filter, "filter changed, pager reset");
            }
            if pager.is_last_page() {
                return Ok(None);
            }
            let (offset, _) = pager.query_params();
            if filter_changed {
                state.filter = filter.to_string();
                state.needs_replace = true;
            }
            (state.gate.begin(), offset)
        };

        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string())
            .append_pair("filter", filter);

        Ok(Some(self.pending(token, url, PagerMode::List)))
    }

    /// Next page of preferred city ids.
    pub async fn get_prefs(&self) -> Result<ListOutcome<CityId>> {
        match self.prepare_prefs()? {
            Some(page) => self.fetch(page).await,
            None => Ok(ListOutcome::NotIssued),
        }
    }

    fn prepare_prefs(&self) -> Result<Option<PendingPage<CityId>>> {
        let limit = self.config.limit;
        let mut url = self.endpoint(&self.config.prefs_endpoint)?;

        let (token, offset) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let pager = state.pager_for(PagerMode::Prefs, limit);
            if pager.is_last_page() {
                return Ok(None);
            }
            let (offset, _) = pager.query_params();
            (state.gate.begin(), offset)
        };

        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());

        Ok(Some(self.pending(token, url, PagerMode::Prefs)))
    }

    fn pending<T>(&self, token: SessionToken, url: Url, mode: PagerMode) -> PendingPage<T> {
        PendingPage {
            session: SessionGuard {
                state: self.state.clone(),
                id: token.id(),
            },
            token,
            url,
            mode,
            _rows: PhantomData,
        }
    }

    /// Send a prepared page and advance the pager if it is still current.
    pub async fn fetch<T: DeserializeOwned>(&self, page: PendingPage<T>) -> Result<ListOutcome<T>> {
        let PendingPage {
            session,
            token,
            url,
            mode,
            ..
        } = page;
        let id = session.id;

        let value = token.wrap(self.transport.get(url)).await??;
        let page: Paged<T> = decode(value)?;

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if !state.gate.settle(id) {
            tracing::debug!("discarding superseded page");
            return Err(FetchError::Cancelled);
        }
        let pager = match state.pager.as_mut() {
            Some(pager) if pager.mode() == mode => pager,
            _ => return Err(FetchError::Cancelled),
        };
        pager.advance(page.total);
        let is_last_page = pager.is_last_page();
        let was_filter_reset = std::mem::take(&mut state.needs_replace);

        tracing::debug!(
            ?mode,
            rows = page.data.len(),
            total = page.total,
            is_last_page,
            "page accepted"
        );

        Ok(ListOutcome::Page {
            data: page.data,
            was_filter_reset,
            is_last_page,
        })
    }

    // =========================================================================
    // DIRECT ENDPOINTS
    // =========================================================================

    /// Flip a preference: sends `{id: !currently_enabled}`.
    ///
    /// Not gated; list traffic never aborts a toggle.
    pub async fn update_pref(&self, id: CityId, currently_enabled: bool) -> Result<()> {
        let url = self.endpoint(&self.config.prefs_endpoint)?;
        let body = serde_json::to_value(PreferencePatch::single(id, !currently_enabled))?;

        match self.transport.patch(url, body).await? {
            Some(reply) => match ApiErrorBody::from_value(&reply) {
                Some(err) => Err(FetchError::Api(err.message)),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    /// Single city by id
    pub async fn get_single(&self, id: CityId) -> Result<City> {
        let url = self.endpoint(&self.config.single_path(id))?;
        decode(self.transport.get(url).await?)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|e| FetchError::Transport(format!("invalid URL '{}': {}", raw, e)))
    }
}

/// Normalize a raw body: error envelope → `Api`, otherwise decode `T`.
fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    if let Some(err) = ApiErrorBody::from_value(&value) {
        return Err(FetchError::Api(err.message));
    }
    Ok(serde_json::from_value(value)?)
}
