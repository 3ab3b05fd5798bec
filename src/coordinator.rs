//! Application-facing session coordinator
//!
//! [`AuthCoordinator`] is what an application's composition root owns. Its
//! startup routine ([`AuthCoordinator::start`]) runs:
//!
//! 1. discovery against the configured issuer,
//! 2. token lifecycle manager and session controller initialisation,
//! 3. token restoration from the secure store,
//! 4. an access-token expiry check,
//! 5. a refresh when the access token has expired,
//!
//! and then publishes an [`AuthState`]. Failures never escape `start`; they
//! collapse to `is_authenticated = false` with the error text attached.
//!
//! State changes are published on a `tokio::sync::watch` channel; see
//! [`AuthCoordinator::watch_state`].

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::auth::authorize::AuthorizationRequester;
use crate::auth::claims::AccessTokenClaims;
use crate::auth::discovery::fetch_discovery_document;
use crate::auth::lifecycle::TokenLifecycleManager;
use crate::auth::session::SessionController;
use crate::auth::token_store::SecureStore;
use crate::config::ClientConfig;
use crate::error::{Result, SessionError};
use crate::gateway::AuthenticatedClient;

/// Authentication state published to the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthState {
    /// `true` until the startup routine has settled.
    pub loading: bool,
    pub is_authenticated: bool,
    /// Text of the last failure, if the latest transition failed.
    pub error: Option<String>,
}

impl AuthState {
    fn loading() -> Self {
        Self {
            loading: true,
            is_authenticated: false,
            error: None,
        }
    }

    fn settled(is_authenticated: bool, error: Option<String>) -> Self {
        Self {
            loading: false,
            is_authenticated,
            error,
        }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::loading()
    }
}

/// Result of [`AuthCoordinator::logout`].
///
/// Local tokens are cleared in both cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// The Keycloak session was ended and local tokens were removed.
    SignedOut,
    /// Something failed along the way; `error` is the first failure.
    Failed { error: SessionError },
}

impl LogoutOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::SignedOut)
    }

    pub fn error(&self) -> Option<&SessionError> {
        match self {
            Self::SignedOut => None,
            Self::Failed { error } => Some(error),
        }
    }
}

/// Owns the session components for one client and publishes
/// [`AuthState`].
pub struct AuthCoordinator {
    http: reqwest::Client,
    client_config: Arc<ClientConfig>,
    lifecycle: Arc<TokenLifecycleManager>,
    session: Arc<SessionController>,
    state_tx: watch::Sender<AuthState>,
    state_rx: watch::Receiver<AuthState>,
}

impl AuthCoordinator {
    /// Builds the lifecycle manager and session controller over `store`.
    ///
    /// Nothing is fetched until [`start`](Self::start).
    pub fn new(
        http: reqwest::Client,
        client_config: ClientConfig,
        store: Arc<dyn SecureStore>,
    ) -> Self {
        let lifecycle = Arc::new(TokenLifecycleManager::new(http.clone(), store));
        let session = Arc::new(SessionController::new(
            http.clone(),
            Arc::clone(&lifecycle),
        ));
        let (state_tx, state_rx) = watch::channel(AuthState::default());

        Self {
            http,
            client_config: Arc::new(client_config),
            lifecycle,
            session,
            state_tx,
            state_rx,
        }
    }

    pub fn lifecycle(&self) -> &Arc<TokenLifecycleManager> {
        &self.lifecycle
    }

    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    /// An [`AuthenticatedClient`] sharing this coordinator's tokens.
    pub fn client(&self) -> AuthenticatedClient {
        AuthenticatedClient::new(self.http.clone(), Arc::clone(&self.lifecycle))
    }

    /// The current state.
    pub fn state(&self) -> AuthState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to state changes via a [`watch::Receiver`].
    pub fn watch_state(&self) -> watch::Receiver<AuthState> {
        self.state_rx.clone()
    }

    fn publish(&self, state: AuthState) {
        tracing::debug!(
            loading = state.loading,
            is_authenticated = state.is_authenticated,
            "auth state changed"
        );
        let _ = self.state_tx.send(state);
    }

    // -----------------------------------------------------------------------
    // Startup
    // -----------------------------------------------------------------------

    /// Runs the startup routine and returns the published state.
    pub async fn start(&self) -> AuthState {
        self.publish(AuthState::loading());

        let state = match self.restore_session().await {
            Ok(is_authenticated) => AuthState::settled(is_authenticated, None),
            Err(e) => {
                tracing::warn!(error = %e, "session restore failed");
                AuthState::settled(false, Some(e.to_string()))
            }
        };

        tracing::info!(is_authenticated = state.is_authenticated, "session restored");
        self.publish(state.clone());
        state
    }

    async fn restore_session(&self) -> Result<bool> {
        let discovery = fetch_discovery_document(&self.http, &self.client_config.issuer).await?;
        self.lifecycle
            .init(
                self.client_config.client_id.clone(),
                discovery.token_endpoint.clone(),
            )
            .await;
        self.session
            .init(Arc::new(discovery), Arc::clone(&self.client_config))
            .await;

        let Some(tokens) = self.lifecycle.retrieve_tokens().await else {
            return Ok(false);
        };
        if !tokens.is_complete() {
            tracing::debug!("stored token set is incomplete; treating as signed out");
            return Ok(false);
        }

        let expired = self
            .lifecycle
            .decode_access_token::<AccessTokenClaims>()
            .await
            .map_or(false, |claims| claims.is_expired());

        if expired {
            if !self.lifecycle.is_initialized().await {
                return Ok(false);
            }
            tracing::info!("stored access token expired; refreshing");
            self.lifecycle.refresh_tokens().await?;
        }

        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Signs in through `requester`, exchanges the code and stores the
    /// tokens.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotInitialized`] if [`start`](Self::start) has
    /// not fetched the discovery document, or the first error from the
    /// authorization request, exchange, or store. The published state
    /// reflects the outcome either way.
    pub async fn login(&self, requester: &dyn AuthorizationRequester) -> Result<()> {
        let outcome = self.complete_login(requester).await;
        match &outcome {
            Ok(()) => {
                tracing::info!("signed in");
                self.publish(AuthState::settled(true, None));
            }
            Err(e) => {
                tracing::warn!(error = %e, "sign-in failed");
                self.publish(AuthState::settled(false, Some(e.to_string())));
            }
        }
        outcome
    }

    async fn complete_login(&self, requester: &dyn AuthorizationRequester) -> Result<()> {
        let discovery = self.session.discovery().await.ok_or_else(|| {
            SessionError::NotInitialized("discovery has not completed; call start first".to_string())
        })?;

        let grant = requester
            .request_authorization(&discovery, &self.client_config)
            .await?;
        let tokens = self.session.request_access_token(&grant).await?;
        self.lifecycle.store_tokens(&tokens).await
    }

    /// Ends the Keycloak session and clears local tokens.
    ///
    /// Local tokens are removed even when the end-session call fails, and
    /// the published state is always signed out.
    pub async fn logout(&self) -> LogoutOutcome {
        let remote = self.session.end_session().await;
        if let Err(e) = &remote {
            tracing::warn!(error = %e, "end session failed; clearing local tokens anyway");
        }

        let local = self.lifecycle.remove_tokens().await;
        if let Err(e) = &local {
            tracing::warn!(error = %e, "failed to remove local tokens");
        }

        let outcome = match remote.and(local) {
            Ok(()) => LogoutOutcome::SignedOut,
            Err(error) => LogoutOutcome::Failed { error },
        };

        self.publish(AuthState::settled(
            false,
            outcome.error().map(ToString::to_string),
        ));
        tracing::info!(success = outcome.is_success(), "signed out");
        outcome
    }

    /// Refreshes the access token and publishes the resulting state.
    pub async fn refresh_access_token(&self) -> Result<()> {
        match self.lifecycle.refresh_tokens().await {
            Ok(_) => {
                self.publish(AuthState::settled(true, None));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "access token refresh failed");
                self.publish(AuthState::settled(false, Some(e.to_string())));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::authorize::MockAuthorizationRequester;
    use crate::auth::token_store::MemoryStore;

    fn coordinator() -> AuthCoordinator {
        AuthCoordinator::new(
            reqwest::Client::new(),
            ClientConfig::default(),
            Arc::new(MemoryStore::new()),
        )
    }

    #[test]
    fn test_initial_state_is_loading() {
        let state = coordinator().state();
        assert!(state.loading);
        assert!(!state.is_authenticated);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_logout_outcome_accessors() {
        assert!(LogoutOutcome::SignedOut.is_success());
        let failed = LogoutOutcome::Failed {
            error: SessionError::NoTokens,
        };
        assert!(!failed.is_success());
        assert_eq!(failed.error(), Some(&SessionError::NoTokens));
    }

    #[tokio::test]
    async fn test_start_with_invalid_issuer_degrades_to_signed_out() {
        let mut config = ClientConfig::default();
        config.issuer = "not a url".to_string();
        let coordinator =
            AuthCoordinator::new(reqwest::Client::new(), config, Arc::new(MemoryStore::new()));

        let state = coordinator.start().await;
        assert!(!state.loading);
        assert!(!state.is_authenticated);
        assert!(state.error.unwrap().contains("Discovery"));
    }

    #[tokio::test]
    async fn test_login_before_start_does_not_call_requester() {
        let coordinator = coordinator();
        let mut requester = MockAuthorizationRequester::new();
        requester.expect_request_authorization().times(0);

        let err = coordinator.login(&requester).await.unwrap_err();
        assert!(matches!(err, SessionError::NotInitialized(_)));
        let state = coordinator.state();
        assert!(!state.is_authenticated);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn test_refresh_before_start_publishes_error() {
        let coordinator = coordinator();
        let mut rx = coordinator.watch_state();

        let err = coordinator.refresh_access_token().await.unwrap_err();
        assert!(matches!(err, SessionError::NotInitialized(_)));

        rx.changed().await.unwrap();
        let state = rx.borrow().clone();
        assert!(!state.loading);
        assert!(!state.is_authenticated);
    }

    #[tokio::test]
    async fn test_logout_before_start_still_clears_tokens() {
        let store = Arc::new(MemoryStore::new());
        store.set("accessToken", "a1").await.unwrap();
        store.set("refreshToken", "r1").await.unwrap();
        let coordinator =
            AuthCoordinator::new(reqwest::Client::new(), ClientConfig::default(), store.clone());

        let outcome = coordinator.logout().await;
        assert!(matches!(
            outcome.error(),
            Some(SessionError::NotInitialized(_))
        ));
        assert!(store.is_empty().await);
        assert!(!coordinator.state().is_authenticated);
    }
}
