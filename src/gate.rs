//! At-most-one-in-flight request gate
//!
//! Each outbound paged request runs inside a session. Beginning a new
//! session aborts the previous one: its future resolves with
//! `Aborted` and the transport drops the underlying connection.

use futures::future::{AbortHandle, AbortRegistration, Abortable};
use std::future::Future;

/// Monotonic id of a request session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

#[derive(Debug)]
struct RequestSession {
    id: SessionId,
    abort: AbortHandle,
}

/// Handed to the caller of `begin`; wraps the transport future so an
/// abort of the session stops it.
#[derive(Debug)]
pub struct SessionToken {
    id: SessionId,
    registration: AbortRegistration,
}

impl SessionToken {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn wrap<F: Future>(self, fut: F) -> Abortable<F> {
        Abortable::new(fut, self.registration)
    }
}

#[derive(Debug, Default)]
pub struct RequestGate {
    active: Option<RequestSession>,
    next_id: u64,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort any active session and start a new one.
    pub fn begin(&mut self) -> SessionToken {
        if let Some(previous) = self.active.take() {
            tracing::debug!(session = previous.id.0, "superseding in-flight request");
            previous.abort.abort();
        }
        self.next_id += 1;
        let id = SessionId(self.next_id);
        let (abort, registration) = AbortHandle::new_pair();
        self.active = Some(RequestSession { id, abort });
        SessionToken { id, registration }
    }

    /// Release `id` if it is still the active session.
    ///
    /// Returns `false` for a late settlement of a superseded session, in
    /// which case the caller must discard its result.
    pub fn settle(&mut self, id: SessionId) -> bool {
        if self.is_current(id) {
            self.active = None;
            true
        } else {
            false
        }
    }

    pub fn is_current(&self, id: SessionId) -> bool {
        self.active.as_ref().is_some_and(|s| s.id == id)
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Abort the active session without starting another (teardown).
    pub fn cancel(&mut self) {
        if let Some(session) = self.active.take() {
            session.abort.abort();
        }
    }
}
