//! Single-flight token refresh.
//!
//! At most one refresh exchange is outstanding at any time. The first caller
//! to find the coordinator [`Idle`](RefreshPhase::Idle) runs the exchange;
//! every caller arriving while it is [`Refreshing`](RefreshPhase::Refreshing)
//! is queued and settled, in arrival order, with the same outcome.
//!
//! ```text
//!            acquire (refresh token stored)
//!   Idle ─────────────────────────────────────▶ Refreshing
//!    ▲                                              │
//!    │  success: persist token, resolve queue FIFO  │
//!    ├──────────────────────────────────────────────┤
//!    │  failure: purge tokens, reject queue FIFO,   │
//!    └──────────── navigate to error_redirect ──────┘
//! ```
//!
//! Every login and logout starts a new session generation. An exchange only
//! commits or purges if the generation it started under is still current;
//! otherwise its outcome is handed to the queue and the store is left alone.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::config::SessionConfig;
use crate::error::{Error, RefreshError};
use crate::identity::IdentityClient;
use crate::state::{NavigationReason, SessionState};
use crate::store::{self, SessionStore};
use crate::transport::Transport;
use crate::types::{AccessToken, RefreshGrant, RefreshToken, StoreKey};

type Settlement = Result<AccessToken, RefreshError>;

/// Coordinator phase. A failed refresh returns to `Idle` with the session cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

/// A caller suspended behind the in-flight exchange. Settled exactly once.
struct QueuedCaller {
    settle: oneshot::Sender<Settlement>,
}

struct RefreshState {
    phase: RefreshPhase,
    pending: VecDeque<QueuedCaller>,
    /// Bumped by every login and logout.
    generation: u64,
}

/// What a caller does after inspecting the state under the lock.
enum Entry {
    Lead(RefreshToken, u64),
    Wait(oneshot::Receiver<Settlement>),
    /// A refresh already committed after the caller's token was rejected.
    Current(AccessToken),
    /// Session already purged under the lock.
    NoRefreshToken,
}

/// Why a token is being acquired.
#[derive(Clone, Copy)]
enum Trigger<'a> {
    Explicit,
    Rejected(Option<&'a AccessToken>),
}

/// Owns the refresh protocol for one session.
pub struct RefreshCoordinator<T> {
    identity: IdentityClient<T>,
    store: Arc<dyn SessionStore>,
    state: SessionState,
    config: Arc<SessionConfig>,
    refresh: Mutex<RefreshState>,
}

impl<T: Transport> RefreshCoordinator<T> {
    #[must_use]
    pub fn new(
        identity: IdentityClient<T>,
        store: Arc<dyn SessionStore>,
        state: SessionState,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            identity,
            store,
            state,
            config,
            refresh: Mutex::new(RefreshState {
                phase: RefreshPhase::Idle,
                pending: VecDeque::new(),
                generation: 0,
            }),
        }
    }

    /// Obtain a fresh access token, running or joining the refresh exchange.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Refresh`] when no refresh token is stored or the
    /// exchange fails. In both cases the session has been terminated.
    pub async fn acquire_token(&self) -> Result<AccessToken, Error> {
        self.acquire(Trigger::Explicit).await
    }

    /// Like [`acquire_token`](Self::acquire_token), for a request whose
    /// `rejected` token was refused by the backend.
    ///
    /// If the session already holds a different token (a refresh committed
    /// while the request was in flight) that token is returned without a new exchange.
    ///
    /// # Errors
    ///
    /// Same as [`acquire_token`](Self::acquire_token).
    pub async fn acquire_token_after_rejection(
        &self,
        rejected: Option<&AccessToken>,
    ) -> Result<AccessToken, Error> {
        self.acquire(Trigger::Rejected(rejected)).await
    }

    async fn acquire(&self, trigger: Trigger<'_>) -> Result<AccessToken, Error> {
        let (refresh_token, generation) = match self.enter(trigger) {
            Entry::Lead(token, generation) => (token, generation),
            Entry::Current(token) => {
                tracing::debug!("Token already replaced by a committed refresh");
                return Ok(token);
            }
            Entry::Wait(settled) => {
                return match settled.await {
                    Ok(outcome) => outcome.map_err(Into::into),
                    Err(_) => Err(RefreshError::Abandoned.into()),
                };
            }
            Entry::NoRefreshToken => {
                tracing::warn!("No refresh token stored; terminating session");
                self.state
                    .navigate(&self.config.error_redirect, NavigationReason::Terminated);
                return Err(RefreshError::NoRefreshToken.into());
            }
        };

        let guard = SettleGuard {
            coordinator: self,
            settled: false,
        };
        let outcome = self.exchange(&refresh_token, generation).await;

        match &outcome {
            Ok(_) => {
                tracing::info!("Access token refreshed");
                guard.settle(&outcome);
            }
            Err(RefreshError::Superseded) => {
                tracing::debug!("Session replaced during refresh; result discarded");
                guard.settle(&outcome);
            }
            Err(e) => {
                let purged = self.purge_if_current(generation);
                guard.settle(&outcome);
                if purged {
                    tracing::warn!(error = %e, "Token refresh failed; terminating session");
                    self.state
                        .navigate(&self.config.error_redirect, NavigationReason::Terminated);
                } else {
                    tracing::debug!(error = %e, "Refresh failed after session was replaced");
                }
            }
        }

        outcome.map_err(Into::into)
    }

    fn enter(&self, trigger: Trigger<'_>) -> Entry {
        let mut refresh = self.refresh.lock();
        if refresh.phase == RefreshPhase::Refreshing {
            let (settle, settled) = oneshot::channel();
            refresh.pending.push_back(QueuedCaller { settle });
            tracing::debug!(queued = refresh.pending.len(), "Waiting on in-flight refresh");
            return Entry::Wait(settled);
        }

        if let Trigger::Rejected(rejected) = trigger {
            if let Some(current) = self.state.access_token() {
                if Some(&current) != rejected {
                    return Entry::Current(current);
                }
            }
        }

        match self
            .store
            .get(StoreKey::RefreshToken)
            .filter(|t| !t.is_empty())
        {
            Some(token) => {
                refresh.phase = RefreshPhase::Refreshing;
                Entry::Lead(RefreshToken::from(token), refresh.generation)
            }
            None => {
                self.purge();
                Entry::NoRefreshToken
            }
        }
    }

    /// One refresh call, bounded by the configured timeout, committed on success.
    async fn exchange(&self, refresh_token: &RefreshToken, generation: u64) -> Settlement {
        let timeout = self.config.refresh_timeout;
        let grant = tokio::time::timeout(timeout, self.identity.refresh(refresh_token))
            .await
            .map_err(|_| RefreshError::Timeout(timeout))??;
        self.commit(grant, generation)
    }

    fn commit(&self, grant: RefreshGrant, generation: u64) -> Settlement {
        let refresh = self.refresh.lock();
        if refresh.generation != generation {
            return Err(RefreshError::Superseded);
        }

        self.store
            .set(StoreKey::AccessToken, grant.access_token.as_str())?;
        if let Some(rotated) = &grant.refresh_token {
            self.store.set(StoreKey::RefreshToken, rotated.as_str())?;
        }
        self.state.set_access_token(Some(grant.access_token.clone()));
        drop(refresh);

        Ok(grant.access_token)
    }
}

impl<T> RefreshCoordinator<T> {
    /// Start a new session generation and run `replace` while no refresh can
    /// commit or purge.
    ///
    /// An exchange already in flight keeps running but its outcome no longer
    /// touches the store or the session state.
    pub(crate) fn begin_session<R>(&self, replace: impl FnOnce() -> R) -> R {
        let mut refresh = self.refresh.lock();
        refresh.generation = refresh.generation.wrapping_add(1);
        replace()
    }

    #[must_use]
    pub fn phase(&self) -> RefreshPhase {
        self.refresh.lock().phase
    }

    /// Number of callers suspended behind the in-flight exchange.
    #[must_use]
    pub fn queued_callers(&self) -> usize {
        self.refresh.lock().pending.len()
    }

    /// Clear the session unless a login or logout replaced it since `generation`.
    fn purge_if_current(&self, generation: u64) -> bool {
        let refresh = self.refresh.lock();
        if refresh.generation != generation {
            return false;
        }
        self.purge();
        drop(refresh);
        true
    }

    fn purge(&self) {
        store::clear_tokens(self.store.as_ref());
        self.state.set_access_token(None);
    }

    /// Return to `Idle` and settle every queued caller, oldest first.
    fn finish(&self, outcome: &Settlement) {
        let pending = {
            let mut refresh = self.refresh.lock();
            refresh.phase = RefreshPhase::Idle;
            std::mem::take(&mut refresh.pending)
        };
        for caller in pending {
            // Receiver gone means that caller was cancelled; nothing to deliver.
            let _ = caller.settle.send(outcome.clone());
        }
    }
}

/// Settles the queue even if the leading task is dropped mid-exchange.
struct SettleGuard<'a, T> {
    coordinator: &'a RefreshCoordinator<T>,
    settled: bool,
}

impl<T> SettleGuard<'_, T> {
    fn settle(mut self, outcome: &Settlement) {
        self.settled = true;
        self.coordinator.finish(outcome);
    }
}

impl<T> Drop for SettleGuard<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Refresh abandoned before settling");
            self.coordinator.finish(&Err(RefreshError::Abandoned));
        }
    }
}
