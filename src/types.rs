use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Short-lived bearer credential attached to authenticated requests.
///
/// Opaque: expiry is learned only from the backend rejecting it.
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccessToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Long-lived credential exchanged for a new [`AccessToken`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct RefreshToken(String);

impl RefreshToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RefreshToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RefreshToken(..)")
    }
}

/// Named entries in the [`SessionStore`](crate::store::SessionStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum StoreKey {
    #[display("access_token")]
    AccessToken,
    #[display("refresh_token")]
    RefreshToken,
}

impl StoreKey {
    pub const ALL: [StoreKey; 2] = [StoreKey::AccessToken, StoreKey::RefreshToken];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

// ── Identity proxy wire bodies ─────────────────────────────────────

/// Login / signup request body.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"..")
            .finish()
    }
}

/// Tokens issued by a successful login.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[non_exhaustive]
pub struct TokenPair {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
}

/// Body sent to the refresh and logout endpoints.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RefreshTokenBody<'a> {
    pub(crate) refresh_token: &'a RefreshToken,
}

/// Response of the refresh endpoint. Rotation of the refresh token is optional.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[non_exhaustive]
pub struct RefreshGrant {
    pub access_token: AccessToken,
    #[serde(default)]
    pub refresh_token: Option<RefreshToken>,
}

/// Response of the logout endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[non_exhaustive]
pub struct LogoutAck {
    #[serde(default)]
    pub status: Option<String>,
}

/// Signup result; the backend defines the body, status is forwarded verbatim.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SignupOutcome {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Error body returned by the identity proxy: `{error}` or `{message}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    /// Best human-readable detail from a raw error body.
    pub(crate) fn detail(raw: &str) -> String {
        serde_json::from_str::<ErrorBody>(raw)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or_else(|| raw.to_owned())
    }
}
