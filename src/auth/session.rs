//! Session controller
//!
//! [`SessionController`] holds the discovery document and client
//! configuration and performs the two session-level calls against Keycloak:
//! the authorization-code exchange and the end-session (logout) request.
//! Neither call touches the stored tokens beyond reading the refresh token;
//! persisting and clearing tokens is the caller's job.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::auth::discovery::DiscoveryDocument;
use crate::auth::lifecycle::{TokenLifecycleManager, TokenResponse};
use crate::config::ClientConfig;
use crate::error::{Result, SessionError};

/// Result of a completed browser authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    /// The `code` query parameter delivered to the redirect URI.
    pub authorization_code: String,
    /// The PKCE verifier whose challenge was sent with the request.
    pub code_verifier: String,
}

#[derive(Debug, Clone)]
struct SessionContext {
    discovery: Arc<DiscoveryDocument>,
    client: Arc<ClientConfig>,
}

/// Performs code exchange and end-session calls for one client.
pub struct SessionController {
    http: reqwest::Client,
    lifecycle: Arc<TokenLifecycleManager>,
    context: RwLock<Option<SessionContext>>,
}

impl SessionController {
    /// Creates an uninitialised controller that reads refresh tokens through
    /// `lifecycle`.
    pub fn new(http: reqwest::Client, lifecycle: Arc<TokenLifecycleManager>) -> Self {
        Self {
            http,
            lifecycle,
            context: RwLock::new(None),
        }
    }

    /// Records the discovery document and client configuration. Last write
    /// wins.
    pub async fn init(&self, discovery: Arc<DiscoveryDocument>, client: Arc<ClientConfig>) {
        tracing::debug!(issuer = %discovery.issuer, client_id = %client.client_id, "session controller initialised");
        *self.context.write().await = Some(SessionContext { discovery, client });
    }

    /// Forgets the discovery document and client configuration.
    pub async fn teardown(&self) {
        *self.context.write().await = None;
    }

    /// The recorded discovery document, if initialised.
    pub async fn discovery(&self) -> Option<Arc<DiscoveryDocument>> {
        self.context
            .read()
            .await
            .as_ref()
            .map(|ctx| Arc::clone(&ctx.discovery))
    }

    /// The recorded client configuration, if initialised.
    pub async fn client_config(&self) -> Option<Arc<ClientConfig>> {
        self.context
            .read()
            .await
            .as_ref()
            .map(|ctx| Arc::clone(&ctx.client))
    }

    async fn context(&self) -> Result<SessionContext> {
        self.context.read().await.clone().ok_or_else(|| {
            SessionError::NotInitialized(
                "session controller has no discovery document or client config".to_string(),
            )
        })
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// The returned tokens are not persisted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotInitialized`] before [`init`](Self::init)
    /// and [`SessionError::ExchangeFailed`] for any transport, status or
    /// parse failure.
    pub async fn request_access_token(&self, grant: &AuthorizationGrant) -> Result<TokenResponse> {
        let ctx = self.context().await?;
        let token_endpoint = ctx.discovery.token_endpoint.as_str();
        tracing::debug!(%token_endpoint, "exchanging authorization code");

        let resp = self
            .http
            .post(token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", grant.authorization_code.as_str()),
                ("code_verifier", grant.code_verifier.as_str()),
                ("client_id", ctx.client.client_id.as_str()),
                ("redirect_uri", ctx.client.sign_in_redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "authorization code exchange request failed");
                SessionError::ExchangeFailed(format!("token exchange request failed: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "token endpoint rejected authorization code");
            return Err(SessionError::ExchangeFailed(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let tokens: TokenResponse = resp.json().await.map_err(|e| {
            tracing::warn!(error = %e, "token exchange response could not be parsed");
            SessionError::ExchangeFailed(format!("failed to parse token response: {e}"))
        })?;

        tracing::info!("authorization code exchanged");
        Ok(tokens)
    }

    /// Ends the Keycloak session by posting the stored refresh token to the
    /// end-session endpoint.
    ///
    /// Local tokens are left untouched whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotInitialized`] before [`init`](Self::init) or when
    ///   the provider has no end-session endpoint.
    /// - [`SessionError::NoTokens`] / [`SessionError::NoRefreshToken`] when
    ///   no refresh token can be read.
    /// - [`SessionError::EndSessionFailed`] on a non-2xx response.
    pub async fn end_session(&self) -> Result<()> {
        let ctx = self.context().await?;
        let endpoint = ctx.discovery.end_session_endpoint.as_deref().ok_or_else(|| {
            SessionError::NotInitialized(
                "discovery document has no end_session_endpoint".to_string(),
            )
        })?;

        let tokens = self
            .lifecycle
            .retrieve_tokens()
            .await
            .ok_or(SessionError::NoTokens)?;
        let refresh_token = tokens.refresh_token.ok_or(SessionError::NoRefreshToken)?;

        tracing::debug!(%endpoint, "ending session");
        let resp = self
            .http
            .post(endpoint)
            .form(&[
                ("client_id", ctx.client.client_id.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SessionError::EndSessionFailed {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        tracing::info!("session ended");
        Ok(())
    }
}
