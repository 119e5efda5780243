use std::time::Duration;

/// Errors surfaced by the session core.
///
/// Only [`Error::is_authorization_expired`] failures are intercepted and
/// retried by the dispatcher; every other variant reaches the caller as-is.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No access token available for a request that requires one.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The API answered with a non-success status.
    #[error("Request failed with status {status}: {detail}")]
    Status {
        status: u16,
        detail: String,
    },

    /// The identity proxy rejected a login, signup, refresh or logout call.
    #[error("{operation} failed with status {status}: {detail}")]
    Identity {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    /// The refresh exchange could not produce a new access token.
    #[error("Token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    #[cfg(feature = "client")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Network failure reported by a non-reqwest transport.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    /// Session store read/write failed.
    #[error("Session store error: {0}")]
    Store(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// `true` when the backend rejected the access token (HTTP 401).
    #[must_use]
    pub fn is_authorization_expired(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }

    /// `true` when the session was terminated because the refresh exchange failed.
    #[must_use]
    pub fn is_refresh_failure(&self) -> bool {
        matches!(self, Self::Refresh(_))
    }
}

/// Outcome of a failed refresh exchange.
///
/// Cloneable so the same failure can be handed to every caller queued
/// behind the exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RefreshError {
    #[error("no refresh token stored")]
    NoRefreshToken,

    #[error("refresh rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("refresh transport failure: {0}")]
    Transport(String),

    #[error("refresh timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not persist refreshed token: {0}")]
    Store(String),

    /// The task driving the exchange was dropped before it settled.
    #[error("refresh abandoned before completion")]
    Abandoned,

    /// A login or logout replaced the session while the exchange was in flight.
    #[error("session replaced before refresh completed")]
    Superseded,
}

impl From<Error> for RefreshError {
    fn from(e: Error) -> Self {
        match e {
            Error::Identity { status, detail, .. } | Error::Status { status, detail } => {
                Self::Rejected { status, detail }
            }
            Error::Refresh(inner) => inner,
            Error::Store(msg) => Self::Store(msg),
            other => Self::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_401_counts_as_expired() {
        let expired = Error::Status {
            status: 401,
            detail: String::new(),
        };
        let forbidden = Error::Status {
            status: 403,
            detail: String::new(),
        };
        assert!(expired.is_authorization_expired());
        assert!(!forbidden.is_authorization_expired());
        assert!(!Error::Unauthenticated.is_authorization_expired());
    }

    #[test]
    fn identity_rejection_maps_to_rejected() {
        let e = Error::Identity {
            operation: "refresh",
            status: 401,
            detail: "expired".into(),
        };
        assert_eq!(
            RefreshError::from(e),
            RefreshError::Rejected {
                status: 401,
                detail: "expired".into()
            }
        );
    }

    #[test]
    fn network_failure_maps_to_transport() {
        let e = Error::Transport("connection reset".into());
        assert!(matches!(RefreshError::from(e), RefreshError::Transport(msg) if msg.contains("connection reset")));
    }

    #[test]
    fn refresh_error_displays_through_wrapper() {
        let e = Error::from(RefreshError::NoRefreshToken);
        assert_eq!(e.to_string(), "Token refresh failed: no refresh token stored");
        assert!(e.is_refresh_failure());
    }
}
