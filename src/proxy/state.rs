use std::sync::Arc;

use super::config::ProxyConfig;

/// Shared state for proxy route handlers.
#[derive(Clone)]
pub(super) struct ProxyState {
    pub(super) http: reqwest::Client,
    pub(super) config: Arc<ProxyConfig>,
}
