//! Identity proxy for Axum.
//!
//! Forwards login/signup/refresh/logout from the client to the identity
//! backend so the client only ever talks to one origin.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use session_keeper::proxy::{ProxyConfig, proxy_routes};
//!
//! let config = ProxyConfig::from_env()?;
//! let app = axum::Router::new().merge(proxy_routes(config));
//! ```

mod config;
mod error;
mod routes;
mod state;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use routes::{proxy_routes, proxy_routes_with_client};
