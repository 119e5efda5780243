#![doc = include_str!("../README.md")]

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod identity;
#[cfg(feature = "proxy")]
pub mod proxy;
pub mod session;
pub mod state;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-exports for convenient access
pub use config::SessionConfig;
pub use coordinator::{RefreshCoordinator, RefreshPhase};
pub use dispatcher::RequestDispatcher;
pub use error::{Error, RefreshError};
pub use identity::IdentityClient;
pub use session::SessionContext;
pub use state::{NavigationReason, SessionEvent, SessionSnapshot, SessionState};
pub use store::{FileStore, MemoryStore, SessionStore};
#[cfg(feature = "client")]
pub use transport::HttpTransport;
pub use transport::{ApiRequest, ApiResponse, Transport};
pub use types::{
    AccessToken, Credentials, LogoutAck, RefreshGrant, RefreshToken, SignupOutcome, StoreKey,
    TokenPair,
};

/// Re-export of the `http` types used in [`ApiRequest`] / [`ApiResponse`].
pub use http::{Method, StatusCode};
