use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Session client configuration.
///
/// `base_url` is a constructor parameter, so there is no runtime "missing field" error.
///
/// Use [`from_env()`](SessionConfig::from_env) for convention-based setup,
/// or [`new()`](SessionConfig::new) with `with_*` methods for full control.
///
/// ```rust,ignore
/// use session_keeper::SessionConfig;
///
/// let config = SessionConfig::new("http://localhost:3000/api/".parse()?)
///     .with_refresh_timeout(std::time::Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SessionConfig {
    pub(crate) base_url: Url,
    pub(crate) login_path: String,
    pub(crate) signup_path: String,
    pub(crate) refresh_path: String,
    pub(crate) logout_path: String,
    pub(crate) refresh_timeout: Duration,
    pub(crate) login_redirect: String,
    pub(crate) logout_redirect: String,
    pub(crate) error_redirect: String,
}

impl SessionConfig {
    /// Create a configuration rooted at the identity proxy / API base URL.
    ///
    /// A trailing `/` is added when missing so relative request paths join below it.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url: with_trailing_slash(base_url),
            login_path: "auth/login".into(),
            signup_path: "auth/signup".into(),
            refresh_path: "auth/refresh".into(),
            logout_path: "auth/logout".into(),
            refresh_timeout: Duration::from_secs(10),
            login_redirect: "/dashboard".into(),
            logout_redirect: "/login".into(),
            error_redirect: "/login".into(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `SESSION_API_URL`: base URL of the identity proxy / API
    ///
    /// # Optional env vars
    /// - `SESSION_LOGIN_PATH`, `SESSION_SIGNUP_PATH`, `SESSION_REFRESH_PATH`, `SESSION_LOGOUT_PATH`
    /// - `SESSION_REFRESH_TIMEOUT_SECS`: refresh exchange timeout in seconds
    /// - `SESSION_LOGIN_REDIRECT`, `SESSION_LOGOUT_REDIRECT`, `SESSION_ERROR_REDIRECT`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL is missing or any value is invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let base_url: Url = lookup("SESSION_API_URL")
            .ok_or_else(|| Error::Config("SESSION_API_URL is required".into()))?
            .parse()
            .map_err(|e| Error::Config(format!("SESSION_API_URL: {e}")))?;

        let mut config = Self::new(base_url);

        if let Some(path) = lookup("SESSION_LOGIN_PATH") {
            config = config.with_login_path(path);
        }
        if let Some(path) = lookup("SESSION_SIGNUP_PATH") {
            config = config.with_signup_path(path);
        }
        if let Some(path) = lookup("SESSION_REFRESH_PATH") {
            config = config.with_refresh_path(path);
        }
        if let Some(path) = lookup("SESSION_LOGOUT_PATH") {
            config = config.with_logout_path(path);
        }
        if let Some(secs) = lookup("SESSION_REFRESH_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("SESSION_REFRESH_TIMEOUT_SECS: {e}")))?;
            config = config.with_refresh_timeout(Duration::from_secs(secs));
        }
        if let Some(path) = lookup("SESSION_LOGIN_REDIRECT") {
            config = config.with_login_redirect(path);
        }
        if let Some(path) = lookup("SESSION_LOGOUT_REDIRECT") {
            config = config.with_logout_redirect(path);
        }
        if let Some(path) = lookup("SESSION_ERROR_REDIRECT") {
            config = config.with_error_redirect(path);
        }

        Ok(config)
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

    /// Upper bound on a single refresh exchange. Elapsed counts as a refresh failure.
    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Where to navigate after a successful login.
    #[must_use]
    pub fn with_login_redirect(mut self, path: impl Into<String>) -> Self {
        self.login_redirect = path.into();
        self
    }

    /// Where to navigate after logout.
    #[must_use]
    pub fn with_logout_redirect(mut self, path: impl Into<String>) -> Self {
        self.logout_redirect = path.into();
        self
    }

    /// Where to navigate when the session is forcibly terminated.
    #[must_use]
    pub fn with_error_redirect(mut self, path: impl Into<String>) -> Self {
        self.error_redirect = path.into();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn refresh_timeout(&self) -> Duration {
        self.refresh_timeout
    }

    #[must_use]
    pub fn login_redirect(&self) -> &str {
        &self.login_redirect
    }

    #[must_use]
    pub fn logout_redirect(&self) -> &str {
        &self.logout_redirect
    }

    #[must_use]
    pub fn error_redirect(&self) -> &str {
        &self.error_redirect
    }
}

pub(crate) fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
