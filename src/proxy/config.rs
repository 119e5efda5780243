use url::Url;

use super::error::ProxyError;

/// Identity proxy configuration.
///
/// Use [`from_env()`](ProxyConfig::from_env) for convention-based setup,
/// or [`new()`](ProxyConfig::new) with `with_*` methods for full control.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub(crate) upstream: Url,
    pub(crate) auth_path: String,
    pub(crate) login_path: String,
    pub(crate) signup_path: String,
    pub(crate) refresh_path: String,
    pub(crate) logout_path: String,
}

impl ProxyConfig {
    /// Create config forwarding to the identity backend at `upstream`.
    ///
    /// Upstream paths default to `auth/login`, `auth/register`, `auth/refresh`, `auth/logout`.
    #[must_use]
    pub fn new(upstream: Url) -> Self {
        Self {
            upstream: crate::config::with_trailing_slash(upstream),
            auth_path: "/api/auth".into(),
            login_path: "auth/login".into(),
            signup_path: "auth/register".into(),
            refresh_path: "auth/refresh".into(),
            logout_path: "auth/logout".into(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `PROXY_UPSTREAM_URL`: identity backend base URL (default `http://localhost:8080/`)
    /// - `PROXY_AUTH_PATH`: mount point of the proxy routes (default `/api/auth`)
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] if the upstream URL is invalid.
    pub fn from_env() -> Result<Self, ProxyError> {
        let upstream: Url = std::env::var("PROXY_UPSTREAM_URL")
            .unwrap_or_else(|_| "http://localhost:8080/".into())
            .parse()
            .map_err(|e| ProxyError::Config(format!("PROXY_UPSTREAM_URL: {e}")))?;

        let mut config = Self::new(upstream);
        if let Ok(path) = std::env::var("PROXY_AUTH_PATH") {
            config = config.with_auth_path(path);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.auth_path = path.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_signup_path(mut self, path: impl Into<String>) -> Self {
        self.signup_path = path.into();
        self
    }

    #[must_use]
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = path.into();
        self
    }

    #[must_use]
    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    #[must_use]
    pub fn auth_path(&self) -> &str {
        &self.auth_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::new("http://localhost:8080".parse().unwrap());
        assert_eq!(config.upstream().as_str(), "http://localhost:8080/");
        assert_eq!(config.auth_path(), "/api/auth");
        assert_eq!(config.signup_path, "auth/register");
    }

    #[test]
    fn test_auth_path_trailing_slash_is_trimmed() {
        let config =
            ProxyConfig::new("http://localhost:8080".parse().unwrap()).with_auth_path("/identity/");
        assert_eq!(config.auth_path(), "/identity");
    }
}
