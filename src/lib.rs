//! keycloak-session - Keycloak OIDC session management library
//!
//! Signs a user in with the OAuth 2.0 authorization code flow and PKCE,
//! keeps the resulting tokens in a secure store, refreshes them on expiry,
//! and provides an HTTP client that retries once with a fresh token when a
//! request comes back `401 Unauthorized`.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: discovery, token storage, token lifecycle, session controller
//!   and the browser authorization request
//! - `gateway`: the token-refreshing authenticated HTTP client
//! - `coordinator`: startup routine, login/logout/refresh entry points and
//!   published authentication state
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keycloak_session::auth::authorize::LoopbackAuthorizer;
//! use keycloak_session::auth::token_store::KeyringStore;
//! use keycloak_session::{AuthCoordinator, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let store = Arc::new(KeyringStore::new(config.storage.service_name.clone()));
//!     let coordinator = AuthCoordinator::new(reqwest::Client::new(), config.client, store);
//!
//!     if !coordinator.start().await.is_authenticated {
//!         coordinator.login(&LoopbackAuthorizer::new()).await?;
//!     }
//!
//!     let me: serde_json::Value = coordinator
//!         .client()
//!         .get("https://api.example.com/me")
//!         .await?;
//!     println!("{me}");
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;

// Re-export commonly used types
pub use auth::lifecycle::{TokenLifecycleManager, TokenResponse};
pub use auth::session::{AuthorizationGrant, SessionController};
pub use auth::token_store::{SecureStore, TokenSet};
pub use config::Config;
pub use coordinator::{AuthCoordinator, AuthState, LogoutOutcome};
pub use error::{Result, SessionError};
pub use gateway::AuthenticatedClient;

#[cfg(test)]
pub mod test_utils;
