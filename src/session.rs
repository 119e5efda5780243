use std::sync::Arc;

use tokio::sync::{OnceCell, broadcast, watch};

use crate::config::SessionConfig;
use crate::coordinator::RefreshCoordinator;
use crate::dispatcher::RequestDispatcher;
use crate::error::Error;
use crate::identity::IdentityClient;
use crate::state::{NavigationReason, SessionEvent, SessionSnapshot, SessionState};
use crate::store::{self, SessionStore};
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::types::{AccessToken, Credentials, RefreshToken, SignupOutcome, StoreKey, TokenPair};

/// Process-wide session: login, logout, startup silent refresh, and the
/// dispatcher every authenticated call goes through.
///
/// # Example
///
/// ```rust,ignore
/// use session_keeper::{FileStore, SessionConfig, SessionContext};
///
/// let config = SessionConfig::from_env()?;
/// let session = SessionContext::connect(config, FileStore::open("session.json")?);
///
/// // Before rendering anything that needs auth
/// session.start().await;
///
/// if session.access_token().is_none() {
///     session.login("user@example.com", "secret").await?;
/// }
/// let receipts: Vec<Receipt> = session.dispatcher().send_json(ApiRequest::get("receipts")).await?;
/// ```
pub struct SessionContext<T> {
    config: Arc<SessionConfig>,
    transport: Arc<T>,
    store: Arc<dyn SessionStore>,
    state: SessionState,
    identity: IdentityClient<T>,
    coordinator: Arc<RefreshCoordinator<T>>,
    dispatcher: RequestDispatcher<T>,
    startup: OnceCell<()>,
}

impl<T: Transport> SessionContext<T> {
    /// Wire up a session over `transport`, seeding state from `store`.
    #[must_use]
    pub fn new<S: SessionStore>(config: SessionConfig, transport: T, store: S) -> Self {
        Self::with_shared_store(config, transport, Arc::new(store))
    }

    /// Same as [`new`](Self::new) for a store the caller keeps a handle to.
    #[must_use]
    pub fn with_shared_store(
        config: SessionConfig,
        transport: T,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let config = Arc::new(config);
        let transport = Arc::new(transport);
        let state = SessionState::new(store.get(StoreKey::AccessToken).map(AccessToken::from));
        let identity = IdentityClient::new(transport.clone(), config.clone());
        let coordinator = Arc::new(RefreshCoordinator::new(
            identity.clone(),
            store.clone(),
            state.clone(),
            config.clone(),
        ));
        let dispatcher = RequestDispatcher::new(transport.clone(), state.clone(), coordinator.clone());

        Self {
            config,
            transport,
            store,
            state,
            identity,
            coordinator,
            dispatcher,
            startup: OnceCell::new(),
        }
    }

    /// Run the startup silent refresh once.
    ///
    /// If a refresh token is stored, one exchange is attempted through the
    /// coordinator. `is_loading` stays `true` until it settles, whatever the
    /// outcome. Later and concurrent calls wait for the same attempt.
    pub async fn start(&self) {
        self.startup.get_or_init(|| self.silent_refresh()).await;
    }

    async fn silent_refresh(&self) {
        let has_refresh_token = self
            .store
            .get(StoreKey::RefreshToken)
            .is_some_and(|t| !t.is_empty());

        if has_refresh_token {
            match self.coordinator.acquire_token().await {
                Ok(_) => tracing::info!("Silent refresh restored session"),
                Err(e) => tracing::warn!(error = %e, "Silent refresh failed"),
            }
        } else {
            tracing::debug!("No refresh token stored; starting signed out");
        }

        self.state.set_loading(false);
    }

    /// Authenticate with the identity proxy and store the issued tokens.
    ///
    /// # Errors
    ///
    /// Returns the identity proxy's error unchanged (e.g. [`Error::Identity`]
    /// with the backend message) for the caller to display, or
    /// [`Error::Store`] if the tokens could not be persisted. In the latter
    /// case the session is left signed out.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), Error> {
        let pair = self
            .identity
            .login(&Credentials::new(email, password))
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Login failed"))?;

        self.coordinator
            .begin_session(|| self.install_tokens(pair))?;

        tracing::info!("Login successful");
        self.state
            .navigate(&self.config.login_redirect, NavigationReason::LoggedIn);
        Ok(())
    }

    /// Register a new account. Status and body come back as the backend sent them.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the identity proxy is unreachable.
    pub async fn signup(&self, email: &str, password: &str) -> Result<SignupOutcome, Error> {
        self.identity
            .signup(&Credentials::new(email, password))
            .await
    }

    /// End the session.
    ///
    /// Local tokens and state are always cleared. The server-side
    /// invalidation is best effort: its failure is logged, never returned.
    /// Safe to call without an active session.
    pub async fn logout(&self) {
        let refresh_token = self.coordinator.begin_session(|| {
            let token = self
                .store
                .get(StoreKey::RefreshToken)
                .filter(|t| !t.is_empty())
                .map(RefreshToken::from);
            self.clear_local();
            token
        });

        if let Some(token) = refresh_token {
            if let Err(e) = self.identity.logout(&token).await {
                tracing::warn!(error = %e, "Logout call failed; local session cleared anyway");
            }
        }

        tracing::info!("Logged out");
        self.state
            .navigate(&self.config.logout_redirect, NavigationReason::LoggedOut);
    }

    /// Both tokens or neither: a failed write leaves the session signed out.
    fn install_tokens(&self, pair: TokenPair) -> Result<(), Error> {
        let stored = self
            .store
            .set(StoreKey::AccessToken, pair.access_token.as_str())
            .and_then(|()| {
                self.store
                    .set(StoreKey::RefreshToken, pair.refresh_token.as_str())
            });
        if let Err(e) = stored {
            tracing::warn!(error = %e, "Could not persist login tokens");
            self.clear_local();
            return Err(e);
        }
        self.state.set_access_token(Some(pair.access_token));
        Ok(())
    }

    fn clear_local(&self) {
        store::clear_tokens(self.store.as_ref());
        self.state.set_access_token(None);
    }

    /// Shorthand for [`RequestDispatcher::send`].
    ///
    /// # Errors
    ///
    /// See [`RequestDispatcher::send`].
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        self.dispatcher.send(request).await
    }

    #[must_use]
    pub fn dispatcher(&self) -> &RequestDispatcher<T> {
        &self.dispatcher
    }

    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator<T> {
        &self.coordinator
    }
}

impl<T> SessionContext<T> {
    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        self.state.access_token()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.state.events()
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[cfg(feature = "client")]
impl SessionContext<crate::transport::HttpTransport> {
    /// Session over a `reqwest` transport rooted at the configured base URL.
    #[must_use]
    pub fn connect<S: SessionStore>(config: SessionConfig, store: S) -> Self {
        let transport = crate::transport::HttpTransport::new(config.base_url().clone());
        Self::new(config, transport, store)
    }
}
