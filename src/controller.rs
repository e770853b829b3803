//! Fetch Controller
//!
//! Owns the observable picker state and turns UI events into client calls.
//!
//! ## Events
//!
//! - **mount**: load preference ids, then the first list page, then chip names
//! - **filter input**: debounced, starts a new filter epoch when it fires
//! - **scroll near bottom**: next page of the current epoch
//! - **toggle**: optimistic preference flip, committed on success only
//!
//! State is only ever mutated here, from the event methods and from the
//! settlement of the tasks they spawn. A list settlement that belongs to a
//! superseded fetch is dropped without touching state.

use crate::client::{ListOutcome, PagedClient, PendingPage};
use crate::debounce::Debouncer;
use crate::names::NameResolutionCache;
use crate::sink::{ErrorSink, Repaint};
use city_prefs_types::{City, CityId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

// =============================================================================
// STATE
// =============================================================================

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    /// Text as typed, updated on every keystroke
    pub filter_text: String,
    /// All pages accepted since the current epoch started
    pub items: Vec<City>,
    pub selected_ids: HashSet<CityId>,
    /// Toggles sent but not yet settled
    pub pending_toggle_ids: HashSet<CityId>,
    pub loading: bool,
    pub last_page: bool,
    /// Last list failure; cleared by the next fetch
    pub error: Option<String>,
}

/// Where the current filter epoch stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    Loading,
    LastPage,
    Error,
}

impl AppState {
    pub fn phase(&self) -> FetchPhase {
        if self.loading {
            FetchPhase::Loading
        } else if self.error.is_some() {
            FetchPhase::Error
        } else if self.last_page {
            FetchPhase::LastPage
        } else {
            FetchPhase::Idle
        }
    }

    pub fn is_selected(&self, id: CityId) -> bool {
        self.selected_ids.contains(&id)
    }

    pub fn is_pending(&self, id: CityId) -> bool {
        self.pending_toggle_ids.contains(&id)
    }

    fn label_of(&self, id: CityId) -> Option<String> {
        self.items
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.label().to_string())
    }
}

#[derive(Debug, Default)]
struct ControllerState {
    app: AppState,
    /// Filter the current items were fetched for
    applied_filter: String,
    /// Bumped by every list fetch; settlements carrying an older value are stale
    fetch_seq: u64,
    mounting: bool,
}

/// A list fetch whose sequence number and gate session were claimed together
struct ListFetch {
    seq: u64,
    filter: String,
    request: crate::error::Result<Option<PendingPage<City>>>,
}

struct Inner {
    client: Arc<PagedClient>,
    names: Arc<NameResolutionCache>,
    state: Mutex<ControllerState>,
    errors: Arc<dyn ErrorSink>,
    repaint: Arc<dyn Repaint>,
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct FetchController {
    inner: Arc<Inner>,
    debouncer: Debouncer,
}

impl FetchController {
    pub fn new(
        client: Arc<PagedClient>,
        errors: Arc<dyn ErrorSink>,
        repaint: Arc<dyn Repaint>,
    ) -> Self {
        let config = client.config();
        let debouncer = Debouncer::new(config.debounce());
        let names = Arc::new(NameResolutionCache::new(
            client.clone(),
            config.resolve_retries,
        ));
        Self {
            inner: Arc::new(Inner {
                client,
                names,
                state: Mutex::new(ControllerState::default()),
                errors,
                repaint,
            }),
            debouncer,
        }
    }

    /// Copy of the current state for rendering
    pub fn snapshot(&self) -> AppState {
        self.inner.lock().app.clone()
    }

    pub fn names(&self) -> &NameResolutionCache {
        &self.inner.names
    }

    pub fn debounce_window(&self) -> std::time::Duration {
        self.debouncer.window()
    }

    /// Selected cities whose names are known, ordered by name
    pub fn selected_cities(&self) -> Vec<City> {
        let selected: Vec<CityId> = self.inner.lock().app.selected_ids.iter().copied().collect();
        let mut cities: Vec<City> = selected
            .into_iter()
            .filter_map(|id| self.inner.names.get(id))
            .collect();
        cities.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        cities
    }

    /// Initial load: preferences, first list page, chip names.
    ///
    /// Scrolling is a no-op and debounced filter changes are folded into
    /// the first list fetch until this finishes.
    pub fn mount(&self) -> JoinHandle<()> {
        {
            let mut state = self.inner.lock();
            state.mounting = true;
            state.app.loading = true;
        }
        self.inner.request_repaint();

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.load_preferences().await;
            let fetch = {
                let mut state = inner.lock();
                state.mounting = false;
                state.applied_filter = state.app.filter_text.clone();
                inner.begin_fetch(&mut state, true)
            };
            inner.finish_fetch(fetch).await;
            inner.resolve_selected().await;
        })
    }

    /// Record typed text and (re)arm the debounce timer.
    pub fn on_filter_input(&self, text: &str) {
        self.inner.lock().app.filter_text = text.to_string();
        self.inner.request_repaint();

        let inner = self.inner.clone();
        self.debouncer.schedule(async move {
            // Detached so a later keystroke cannot abort a fetch that already fired.
            tokio::spawn(inner.apply_filter());
        });
    }

    /// Next page for the current epoch. `None` when loading or exhausted.
    pub fn on_scroll_near_bottom(&self) -> Option<JoinHandle<()>> {
        let fetch = {
            let mut state = self.inner.lock();
            if state.app.loading || state.app.last_page {
                return None;
            }
            self.inner.begin_fetch(&mut state, false)
        };
        self.inner.request_repaint();

        let inner = self.inner.clone();
        Some(tokio::spawn(async move {
            inner.finish_fetch(fetch).await;
        }))
    }

    /// Flip the preference for `id`.
    ///
    /// The selection only changes once the server confirms. `None` if a
    /// toggle for the same id is still pending.
    pub fn on_toggle(&self, id: CityId) -> Option<JoinHandle<()>> {
        let enabled = {
            let mut state = self.inner.lock();
            if state.app.pending_toggle_ids.contains(&id) {
                return None;
            }
            state.app.pending_toggle_ids.insert(id);
            state.app.selected_ids.contains(&id)
        };
        self.inner.request_repaint();

        let inner = self.inner.clone();
        Some(tokio::spawn(async move {
            let result = inner.client.update_pref(id, enabled).await;
            inner.settle_toggle(id, enabled, result);
        }))
    }

    /// Cancel the pending debounced call and abort the in-flight list request.
    pub fn shutdown(&self) {
        self.debouncer.cancel();
        self.inner.client.abort();
    }
}

impl Drop for FetchController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// TASK BODIES
// =============================================================================

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_repaint(&self) {
        self.repaint.request_repaint();
    }

    /// Mark a list fetch for `applied_filter` as started.
    ///
    /// The client's gate is claimed under the same lock that bumps
    /// `fetch_seq`, so the newest sequence number always owns the newest
    /// session whatever order the spawned tasks later run in.
    fn begin_fetch(&self, state: &mut ControllerState, new_epoch: bool) -> ListFetch {
        state.fetch_seq += 1;
        state.app.loading = true;
        state.app.error = None;
        if new_epoch {
            state.app.last_page = false;
        }
        ListFetch {
            seq: state.fetch_seq,
            filter: state.applied_filter.clone(),
            request: self.client.prepare_list(&state.applied_filter),
        }
    }

    async fn finish_fetch(&self, fetch: ListFetch) {
        let ListFetch {
            seq,
            filter,
            request,
        } = fetch;
        let outcome = match request {
            Ok(Some(page)) => self.client.fetch(page).await,
            Ok(None) => Ok(ListOutcome::NotIssued),
            Err(e) => Err(e),
        };

        let mut notice = None;
        {
            let mut state = self.lock();
            if state.fetch_seq != seq {
                tracing::debug!(seq, "dropping settlement of superseded fetch");
                return;
            }
            state.app.loading = false;
            match outcome {
                Ok(ListOutcome::NotIssued) => {
                    state.app.last_page = true;
                }
                Ok(ListOutcome::Page {
                    data,
                    was_filter_reset,
                    is_last_page,
                }) => {
                    if was_filter_reset {
                        state.app.items = data;
                    } else {
                        state.app.items.extend(data);
                    }
                    state.app.last_page = is_last_page;
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    tracing::warn!(%filter, error = %e, "list fetch failed");
                    let message = e.to_string();
                    state.app.error = Some(message.clone());
                    notice = Some(message);
                }
            }
        }

        if let Some(message) = notice {
            self.errors.report(message);
        }
        self.request_repaint();
    }

    /// Debounce target: start a new epoch for the latest typed text.
    async fn apply_filter(self: Arc<Self>) {
        let fetch = {
            let mut state = self.lock();
            if state.mounting {
                return;
            }
            let filter = state.app.filter_text.clone();
            if filter.trim() == state.applied_filter.trim() && state.app.error.is_none() {
                return;
            }
            state.applied_filter = filter;
            self.begin_fetch(&mut state, true)
        };
        self.request_repaint();
        self.finish_fetch(fetch).await;
    }

    /// Walk every preference page into `selected_ids`.
    async fn load_preferences(&self) {
        loop {
            match self.client.get_prefs().await {
                Ok(ListOutcome::Page {
                    data, is_last_page, ..
                }) => {
                    self.lock().app.selected_ids.extend(data);
                    self.request_repaint();
                    if is_last_page {
                        break;
                    }
                }
                Ok(ListOutcome::NotIssued) => break,
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    tracing::warn!(error = %e, "preference load failed");
                    self.errors.report(e.to_string());
                    break;
                }
            }
        }
    }

    /// Resolve names of selected ids for chips.
    async fn resolve_selected(&self) {
        let missing: Vec<CityId> = {
            let state = self.lock();
            state
                .app
                .selected_ids
                .iter()
                .copied()
                .filter(|id| self.names.get(*id).is_none())
                .collect()
        };
        let known: Vec<City> = {
            let state = self.lock();
            state
                .app
                .items
                .iter()
                .filter(|c| missing.contains(&c.id))
                .cloned()
                .collect()
        };
        for city in known {
            self.names.remember(city);
        }

        let lookups = missing
            .into_iter()
            .filter(|id| self.names.get(*id).is_none())
            .map(|id| self.names.resolve(id));
        for result in futures::future::join_all(lookups).await {
            if let Err(e) = result {
                self.errors.report(e.to_string());
            }
        }
        self.request_repaint();
    }

    fn settle_toggle(&self, id: CityId, was_enabled: bool, result: crate::error::Result<()>) {
        let mut notice = None;
        let mut newly_selected = None;
        {
            let mut state = self.lock();
            state.app.pending_toggle_ids.remove(&id);
            match result {
                Ok(()) => {
                    if was_enabled {
                        state.app.selected_ids.remove(&id);
                    } else {
                        state.app.selected_ids.insert(id);
                        newly_selected = state.app.items.iter().find(|c| c.id == id).cloned();
                    }
                    tracing::info!(%id, enabled = !was_enabled, "preference saved");
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "preference toggle failed");
                    let label = state
                        .app
                        .label_of(id)
                        .or_else(|| self.names.get(id).map(|c| c.name));
                    notice = Some(match label {
                        Some(name) => format!("{} - {}", name, e),
                        None => e.to_string(),
                    });
                }
            }
        }

        if let Some(city) = newly_selected {
            self.names.remember(city);
        }
        if let Some(message) = notice {
            self.errors.report(message);
        }
        self.request_repaint();
    }
}
