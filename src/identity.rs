use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::config::SessionConfig;
use crate::error::Error;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::types::{
    Credentials, ErrorBody, LogoutAck, RefreshGrant, RefreshToken, RefreshTokenBody,
    SignupOutcome, TokenPair,
};

/// Client for the identity proxy's login/signup/refresh/logout endpoints.
///
/// Calls go straight to the [`Transport`], never through the
/// [`RequestDispatcher`](crate::dispatcher::RequestDispatcher), so a 401 from
/// the refresh endpoint cannot trigger another refresh.
pub struct IdentityClient<T> {
    transport: Arc<T>,
    config: Arc<SessionConfig>,
}

impl<T> Clone for IdentityClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: Transport> IdentityClient<T> {
    #[must_use]
    pub fn new(transport: Arc<T>, config: Arc<SessionConfig>) -> Self {
        Self { transport, config }
    }

    /// Exchange credentials for a token pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Identity`] carrying the backend's message if the
    /// credentials are rejected, or a transport error on network failure.
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair, Error> {
        let request = ApiRequest::post(&self.config.login_path).with_json(credentials)?;
        let response = self.transport.execute(&request).await?;
        Self::decode(response, "login")
    }

    /// Register a new account. Status and body are forwarded verbatim.
    ///
    /// # Errors
    ///
    /// Returns a transport error on network failure. A non-2xx status is not an error here.
    pub async fn signup(&self, credentials: &Credentials) -> Result<SignupOutcome, Error> {
        let request = ApiRequest::post(&self.config.signup_path).with_json(credentials)?;
        let response = self.transport.execute(&request).await?;
        let body = if response.bytes().is_empty() {
            serde_json::Value::Null
        } else {
            response
                .json()
                .unwrap_or_else(|_| serde_json::Value::String(response.text()))
        };
        Ok(SignupOutcome {
            status: response.status().as_u16(),
            body,
        })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Identity`] if the refresh token is invalid or expired,
    /// or a transport error on network failure.
    pub async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshGrant, Error> {
        let request = ApiRequest::post(&self.config.refresh_path)
            .with_json(&RefreshTokenBody { refresh_token })?;
        let response = self.transport.execute(&request).await?;
        Self::decode(response, "refresh")
    }

    /// Invalidate a refresh token server-side.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Identity`] if the backend refuses, or a transport error.
    pub async fn logout(&self, refresh_token: &RefreshToken) -> Result<LogoutAck, Error> {
        let request = ApiRequest::post(&self.config.logout_path)
            .with_json(&RefreshTokenBody { refresh_token })?;
        let response = self.transport.execute(&request).await?;
        if response.status().is_success() && response.bytes().is_empty() {
            return Ok(LogoutAck::default());
        }
        Self::decode(response, "logout")
    }

    /// Checks the response status; decodes the body on success or returns an error with details.
    fn decode<R: DeserializeOwned>(
        response: ApiResponse,
        operation: &'static str,
    ) -> Result<R, Error> {
        if !response.status().is_success() {
            return Err(Error::Identity {
                operation,
                status: response.status().as_u16(),
                detail: ErrorBody::detail(&response.text()),
            });
        }
        response.json()
    }
}
