//! Keycloak OIDC authorization
//!
//! # Module Layout
//!
//! - [`authorize`]   -- browser authorization request with PKCE and a
//!   loopback redirect listener
//! - [`claims`]      -- access token claim decoding and expiry
//! - [`discovery`]   -- OpenID Connect discovery document
//! - [`lifecycle`]   -- token store/restore/refresh with single-flight
//!   refresh
//! - [`session`]     -- authorization code exchange and end-session
//! - [`token_store`] -- secure token persistence (OS keyring or memory)

pub mod authorize;
pub mod claims;
pub mod discovery;
pub mod lifecycle;
pub mod session;
pub mod token_store;
