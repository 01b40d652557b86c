// Shared authentication state
// One instance per process by default, shared by every client

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;

use super::types::{SessionCookie, StrategyId};

/// Handle to an authentication state shared between clients
///
/// Locks are held only for reads and writes of the fields, never across a
/// network call. Concurrent negotiation from several threads is not
/// coordinated; callers that need it must serialize access themselves.
pub type SharedAuthState = Arc<Mutex<AuthState>>;

static PROCESS_AUTH_STATE: Lazy<SharedAuthState> =
    Lazy::new(|| Arc::new(Mutex::new(AuthState::default())));

/// Active strategy plus the cookie and crumb it produced
#[derive(Debug, Default)]
pub struct AuthState {
    strategy: StrategyId,
    cookie: Option<SessionCookie>,
    crumb: Option<String>,
}

impl AuthState {
    /// The process-wide state, created on first use
    pub fn process_shared() -> SharedAuthState {
        Arc::clone(&PROCESS_AUTH_STATE)
    }

    /// A fresh state not shared with the process-wide instance
    pub fn isolated() -> SharedAuthState {
        Arc::new(Mutex::new(AuthState::default()))
    }

    pub fn strategy(&self) -> StrategyId {
        self.strategy
    }

    pub fn cookie(&self) -> Option<&SessionCookie> {
        self.cookie.as_ref()
    }

    pub fn crumb(&self) -> Option<&str> {
        self.crumb.as_deref()
    }

    pub(crate) fn set_cookie(&mut self, cookie: SessionCookie) {
        self.cookie = Some(cookie);
    }

    pub(crate) fn set_crumb(&mut self, crumb: String) {
        self.crumb = Some(crumb);
    }

    /// Switch to the other strategy, dropping cookie and crumb first
    pub(crate) fn toggle(&mut self) -> StrategyId {
        self.cookie = None;
        self.crumb = None;
        self.strategy = self.strategy.other();
        self.strategy
    }
}
