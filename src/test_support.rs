//! In-process transport for unit tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;
use parking_lot::Mutex;

use crate::error::Error;
use crate::transport::{ApiRequest, ApiResponse, Transport};

type Reply = Pin<Box<dyn Future<Output = Result<ApiResponse, Error>> + Send>>;
type Handler = Arc<dyn Fn(ApiRequest) -> Reply + Send + Sync>;

/// Transport answering from a closure and recording every request it sees.
pub(crate) struct ScriptedTransport {
    handler: Handler,
    log: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    /// Answer synchronously.
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, Error> + Send + Sync + 'static,
    {
        Self::with_async(move |req| {
            let reply = handler(&req);
            async move { reply }
        })
    }

    /// Answer from a future, so tests can hold a reply until they release it.
    pub(crate) fn with_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(ApiRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse, Error>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |req: ApiRequest| -> Reply { Box::pin(handler(req)) }),
            log: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().clone()
    }

    pub(crate) fn calls(&self, path: &str) -> usize {
        self.log.lock().iter().filter(|r| r.path() == path).count()
    }
}

impl Transport for ScriptedTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        self.log.lock().push(request.clone());
        (self.handler)(request.clone()).await
    }
}

pub(crate) fn json(status: StatusCode, body: serde_json::Value) -> Result<ApiResponse, Error> {
    ApiResponse::json_body(status, &body)
}

/// Backend stub: `200 {"ok":true}` for `valid`, `401` for anything else.
pub(crate) fn protected(req: &ApiRequest, valid: &str) -> Result<ApiResponse, Error> {
    if req.bearer_token() == Some(valid) {
        json(StatusCode::OK, serde_json::json!({"ok": true, "path": req.path()}))
    } else {
        json(StatusCode::UNAUTHORIZED, serde_json::json!({"error": "token expired"}))
    }
}
