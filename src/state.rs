//! Reactive session state shared with UI collaborators.
//!
//! Collaborators subscribe to [`SessionSnapshot`] changes and to
//! [`SessionEvent`] navigation signals instead of polling.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::types::AccessToken;

const EVENT_CAPACITY: usize = 16;

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub access_token: Option<AccessToken>,
    /// `true` until the startup silent refresh has settled.
    pub is_loading: bool,
}

/// Why the core asks the router to navigate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationReason {
    LoggedIn,
    LoggedOut,
    /// Refresh failed or no refresh token was available.
    Terminated,
}

/// Signals emitted to an external router.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionEvent {
    Navigate {
        to: String,
        reason: NavigationReason,
    },
}

/// Cheap-to-clone handle on the shared session state.
#[derive(Clone)]
pub struct SessionState {
    inner: Arc<StateInner>,
}

struct StateInner {
    snapshot: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionState {
    pub(crate) fn new(access_token: Option<AccessToken>) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot {
            access_token,
            is_loading: true,
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(StateInner { snapshot, events }),
        }
    }

    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        self.inner.snapshot.borrow().access_token.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.snapshot.borrow().is_loading
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Receive every snapshot change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Receive navigation signals emitted after this call.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn set_access_token(&self, token: Option<AccessToken>) {
        self.inner.snapshot.send_if_modified(|s| {
            if s.access_token == token {
                return false;
            }
            s.access_token = token;
            true
        });
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.inner.snapshot.send_if_modified(|s| {
            let changed = s.is_loading != loading;
            s.is_loading = loading;
            changed
        });
    }

    pub(crate) fn navigate(&self, to: &str, reason: NavigationReason) {
        tracing::debug!(to = %to, reason = ?reason, "Navigation requested");
        // No subscribers is fine: nobody is routing.
        let _ = self.inner.events.send(SessionEvent::Navigate {
            to: to.to_owned(),
            reason,
        });
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("snapshot", &*self.inner.snapshot.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_loading_with_seeded_token() {
        let state = SessionState::new(Some(AccessToken::from("A1")));
        assert!(state.is_loading());
        assert_eq!(state.access_token(), Some(AccessToken::from("A1")));
    }

    #[tokio::test]
    async fn subscribers_see_token_changes() {
        let state = SessionState::new(None);
        let mut rx = state.subscribe();

        state.set_access_token(Some(AccessToken::from("A2")));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().access_token, Some(AccessToken::from("A2")));
    }

    #[test]
    fn unchanged_token_does_not_notify() {
        let state = SessionState::new(Some(AccessToken::from("A1")));
        let rx = state.subscribe();

        state.set_access_token(Some(AccessToken::from("A1")));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn navigation_is_broadcast() {
        let state = SessionState::new(None);
        let mut events = state.events();

        state.navigate("/login", NavigationReason::Terminated);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Navigate {
                to: "/login".into(),
                reason: NavigationReason::Terminated,
            }
        );
    }

    #[test]
    fn navigate_without_subscribers_is_silent() {
        let state = SessionState::new(None);
        state.navigate("/dashboard", NavigationReason::LoggedIn);
    }
}
