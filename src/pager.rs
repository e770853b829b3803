//! Pagination cursor for one server-paginated result stream.

/// Which stream a pager walks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PagerMode {
    /// City browsing (`/cities`)
    List,
    /// Preference ids (`/preferences/cities`)
    Prefs,
}

/// Offset + fixed page size, plus a latch set once the stream is exhausted.
///
/// `is_last_page` is computed from the *post-advance* offset: after
/// `advance(total)` the flag is set iff `total - 1 <= offset`. Once set it
/// stays set until `reset`.
#[derive(Debug, Clone)]
pub struct Pager {
    mode: PagerMode,
    offset: u64,
    limit: u64,
    is_last_page: bool,
}

impl Pager {
    /// `limit` is clamped to at least 1.
    pub fn new(mode: PagerMode, limit: u64) -> Self {
        Self {
            mode,
            offset: 0,
            limit: limit.max(1),
            is_last_page: false,
        }
    }

    pub fn reset(&mut self) {
        self.offset = 0;
        self.is_last_page = false;
    }

    /// Step past the page just accepted. `total` is the collection size
    /// the server declared in that response.
    pub fn advance(&mut self, total: u64) {
        self.offset += self.limit;
        if total.saturating_sub(1) <= self.offset {
            self.is_last_page = true;
        }
    }

    /// `(offset, limit)` for the next request
    pub fn query_params(&self) -> (u64, u64) {
        (self.offset, self.limit)
    }

    pub fn mode(&self) -> PagerMode {
        self.mode
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn is_last_page(&self) -> bool {
        self.is_last_page
    }
}
