use std::sync::Arc;

use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::coordinator::RefreshCoordinator;
use crate::error::Error;
use crate::state::SessionState;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::types::AccessToken;

/// Single chokepoint for authenticated API calls.
///
/// Attaches the current access token, and on a 401 hands over to the
/// [`RefreshCoordinator`] and replays the request once with the new token.
pub struct RequestDispatcher<T> {
    transport: Arc<T>,
    state: SessionState,
    coordinator: Arc<RefreshCoordinator<T>>,
}

impl<T> Clone for RequestDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            state: self.state.clone(),
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<T: Transport> RequestDispatcher<T> {
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        state: SessionState,
        coordinator: Arc<RefreshCoordinator<T>>,
    ) -> Self {
        Self {
            transport,
            state,
            coordinator,
        }
    }

    /// Send a request, recovering once from an expired access token.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthenticated`] if the request requires auth and no token exists.
    /// - [`Error::Refresh`] if the token could not be refreshed (session terminated).
    /// - [`Error::Status`] for any non-2xx response, including a second 401 after the retry.
    /// - Transport errors unchanged; they never trigger a refresh.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, Error> {
        let sent = self.authorize(&mut request)?;
        let response = self.transport.execute(&request).await?;

        if response.status() != StatusCode::UNAUTHORIZED || request.retried {
            return response.error_for_status();
        }

        request.retried = true;
        tracing::debug!(
            method = %request.method(),
            path = %request.path(),
            "Access token rejected; refreshing before retry"
        );

        let token = self
            .coordinator
            .acquire_token_after_rejection(sent.as_ref())
            .await?;
        request.set_bearer(&token)?;

        let response = self.transport.execute(&request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(path = %request.path(), "Request rejected again after refresh");
        }
        response.error_for_status()
    }

    /// [`send`](Self::send) and decode the JSON body.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send), plus [`Error::Json`] if the body does not match `R`.
    pub async fn send_json<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, Error> {
        self.send(request).await?.json()
    }

    fn authorize(&self, request: &mut ApiRequest) -> Result<Option<AccessToken>, Error> {
        match self.state.access_token() {
            Some(token) => {
                request.set_bearer(&token)?;
                Ok(Some(token))
            }
            None if request.requires_auth() => Err(Error::Unauthenticated),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use super::*;
    use crate::config::SessionConfig;
    use crate::coordinator::RefreshPhase;
    use crate::error::RefreshError;
    use crate::identity::IdentityClient;
    use crate::store::{MemoryStore, SessionStore};
    use crate::test_support::{ScriptedTransport, json, protected};
    use crate::types::StoreKey;

    struct Harness {
        dispatcher: RequestDispatcher<ScriptedTransport>,
        coordinator: Arc<RefreshCoordinator<ScriptedTransport>>,
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryStore>,
    }

    fn harness(transport: ScriptedTransport, access: Option<&str>, refresh: Option<&str>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        if let Some(a) = access {
            store.set(StoreKey::AccessToken, a).unwrap();
        }
        if let Some(r) = refresh {
            store.set(StoreKey::RefreshToken, r).unwrap();
        }
        let state = SessionState::new(access.map(AccessToken::from));
        let transport = Arc::new(transport);
        let config = Arc::new(SessionConfig::new("http://proxy.test/api/".parse().unwrap()));
        let coordinator = Arc::new(RefreshCoordinator::new(
            IdentityClient::new(transport.clone(), config.clone()),
            store.clone(),
            state.clone(),
            config,
        ));
        let dispatcher = RequestDispatcher::new(transport.clone(), state, coordinator.clone());
        Harness {
            dispatcher,
            coordinator,
            transport,
            store,
        }
    }

    /// Backend accepting only `A2`, refresh endpoint issuing `A2` for `R1`.
    fn backend(req: &ApiRequest) -> Result<ApiResponse, Error> {
        if req.path() == "auth/refresh" {
            return if req.body().unwrap()["refresh_token"] == "R1" {
                json(StatusCode::OK, serde_json::json!({"access_token": "A2"}))
            } else {
                json(StatusCode::UNAUTHORIZED, serde_json::json!({"error": "invalid refresh token"}))
            };
        }
        protected(req, "A2")
    }

    #[tokio::test]
    async fn attaches_current_token() {
        let h = harness(ScriptedTransport::new(|req| protected(req, "A1")), Some("A1"), Some("R1"));

        let response = h.dispatcher.send(ApiRequest::get("items")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.transport.requests()[0].bearer_token(), Some("A1"));
    }

    #[tokio::test]
    async fn sends_unauthenticated_without_token() {
        let h = harness(
            ScriptedTransport::new(|_| json(StatusCode::OK, serde_json::json!([]))),
            None,
            None,
        );

        h.dispatcher.send(ApiRequest::get("public")).await.unwrap();
        assert_eq!(h.transport.requests()[0].bearer_token(), None);
    }

    #[tokio::test]
    async fn require_auth_without_token_fails_before_io() {
        let h = harness(ScriptedTransport::new(|_| panic!("no request expected")), None, None);

        let err = h
            .dispatcher
            .send(ApiRequest::get("items").require_auth())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Unauthenticated));
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_request_replayed() {
        let h = harness(ScriptedTransport::new(backend), Some("A1"), Some("R1"));

        let body: serde_json::Value = h.dispatcher.send_json(ApiRequest::get("items")).await.unwrap();

        assert_eq!(body["ok"], true);
        let requests = h.transport.requests();
        let paths: Vec<_> = requests.iter().map(|r| r.path().to_string()).collect();
        assert_eq!(paths, ["items", "auth/refresh", "items"]);
        assert_eq!(requests[0].bearer_token(), Some("A1"));
        assert_eq!(requests[2].bearer_token(), Some("A2"));
        assert!(requests[2].is_retry());
        assert_eq!(h.store.get(StoreKey::AccessToken).as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn second_rejection_is_not_retried() {
        // Refresh succeeds but the backend keeps rejecting.
        let h = harness(
            ScriptedTransport::new(|req| {
                if req.path() == "auth/refresh" {
                    json(StatusCode::OK, serde_json::json!({"access_token": "A2"}))
                } else {
                    protected(req, "never")
                }
            }),
            Some("A1"),
            Some("R1"),
        );

        let err = h.dispatcher.send(ApiRequest::get("items")).await.unwrap_err();

        assert!(err.is_authorization_expired());
        assert_eq!(h.transport.calls("items"), 2);
        assert_eq!(h.transport.calls("auth/refresh"), 1);
    }

    #[tokio::test]
    async fn other_errors_pass_through_untouched() {
        let h = harness(
            ScriptedTransport::new(|req| match req.path() {
                "forbidden" => json(StatusCode::FORBIDDEN, serde_json::json!({"error": "nope"})),
                _ => Err(Error::Transport("connection refused".into())),
            }),
            Some("A1"),
            Some("R1"),
        );

        let err = h.dispatcher.send(ApiRequest::get("forbidden")).await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 403, .. }));

        let err = h.dispatcher.send(ApiRequest::get("down")).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        assert_eq!(h.transport.calls("auth/refresh"), 0);
    }

    #[tokio::test]
    async fn missing_refresh_token_yields_refresh_failure_without_exchange() {
        let h = harness(ScriptedTransport::new(backend), Some("A1"), None);

        let err = h.dispatcher.send(ApiRequest::get("items")).await.unwrap_err();

        assert!(matches!(err, Error::Refresh(RefreshError::NoRefreshToken)));
        assert_eq!(h.transport.calls("auth/refresh"), 0);
        assert_eq!(h.store.get(StoreKey::AccessToken), None);
    }

    #[tokio::test]
    async fn failed_refresh_propagates_without_retry() {
        let h = harness(ScriptedTransport::new(backend), Some("A1"), Some("R-bad"));

        let err = h.dispatcher.send(ApiRequest::get("items")).await.unwrap_err();

        assert!(matches!(err, Error::Refresh(RefreshError::Rejected { status: 401, .. })));
        assert_eq!(h.transport.calls("items"), 1);
        assert_eq!(h.store.get(StoreKey::RefreshToken), None);
    }

    #[tokio::test]
    async fn simultaneous_expiry_triggers_exactly_one_refresh() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            ScriptedTransport::with_async({
                let gate = gate.clone();
                move |req| {
                    let gate = gate.clone();
                    async move {
                        if req.path() == "auth/refresh" {
                            gate.notified().await;
                        }
                        backend(&req)
                    }
                }
            }),
            Some("A1"),
            Some("R1"),
        );

        let calls: Vec<_> = (0..5)
            .map(|i| {
                let d = h.dispatcher.clone();
                tokio::spawn(async move { d.send(ApiRequest::get(format!("items/{i}"))).await })
            })
            .collect();

        while h.coordinator.queued_callers() < 4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.coordinator.phase(), RefreshPhase::Refreshing);
        gate.notify_one();

        for call in calls {
            assert_eq!(call.await.unwrap().unwrap().status(), StatusCode::OK);
        }
        assert_eq!(h.transport.calls("auth/refresh"), 1);
        let replays = h
            .transport
            .requests()
            .into_iter()
            .filter(|r| r.path().starts_with("items/") && r.bearer_token() == Some("A2"))
            .count();
        assert_eq!(replays, 5);
    }

    #[tokio::test]
    async fn late_rejection_after_commit_reuses_new_token() {
        // The first call holds its 401 until the refresh from the second call committed.
        let release_first = Arc::new(Notify::new());
        let seen = Arc::new(Mutex::new(0usize));
        let h = harness(
            ScriptedTransport::with_async({
                let release_first = release_first.clone();
                let seen = seen.clone();
                move |req| {
                    let release_first = release_first.clone();
                    let seen = seen.clone();
                    async move {
                        if req.path() == "slow" && req.bearer_token() == Some("A1") {
                            *seen.lock() += 1;
                            release_first.notified().await;
                        }
                        backend(&req)
                    }
                }
            }),
            Some("A1"),
            Some("R1"),
        );

        let slow = tokio::spawn({
            let d = h.dispatcher.clone();
            async move { d.send(ApiRequest::get("slow")).await }
        });
        while *seen.lock() == 0 {
            tokio::task::yield_now().await;
        }

        h.dispatcher.send(ApiRequest::get("fast")).await.unwrap();
        release_first.notify_one();

        assert_eq!(slow.await.unwrap().unwrap().status(), StatusCode::OK);
        assert_eq!(h.transport.calls("auth/refresh"), 1);
    }
}
