//! Token lifecycle management
//!
//! [`TokenLifecycleManager`] owns the client id and token endpoint, reads and
//! writes the token set through a [`SecureStore`], and implements the refresh
//! protocol:
//!
//! 1. Fail with [`SessionError::NotInitialized`] if the client id or token
//!    endpoint is unset.
//! 2. Retrieve the stored tokens; fail with [`SessionError::NoTokens`] if the
//!    read failed and [`SessionError::NoRefreshToken`] if there is no refresh
//!    token.
//! 3. POST `grant_type=refresh_token&client_id=..&refresh_token=..` to the
//!    token endpoint.
//! 4. On 2xx, persist the response and return it.
//! 5. Otherwise delete every stored token and fail with
//!    [`SessionError::RefreshFailed`].
//!
//! Refreshes are single-flight: callers that queue behind an in-flight
//! refresh receive its outcome instead of issuing their own request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::auth::claims::decode_jwt_claims;
use crate::auth::token_store::{
    SecureStore, TokenSet, ACCESS_TOKEN_KEY, ID_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_KEYS,
};
use crate::error::{Result, SessionError};

// ---------------------------------------------------------------------------
// TokenResponse
// ---------------------------------------------------------------------------

/// JSON body returned by the Keycloak token endpoint.
///
/// Only `access_token` is required; everything else is optional on input so
/// that non-Keycloak providers still parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    /// Access token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Refresh token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<String>,

    #[serde(
        rename = "not-before-policy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub not_before_policy: Option<i64>,
}

impl TokenResponse {
    /// The token values this response carries, as a [`TokenSet`].
    pub fn token_set(&self) -> TokenSet {
        TokenSet {
            access_token: Some(self.access_token.clone()),
            refresh_token: self.refresh_token.clone(),
            id_token: self.id_token.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// TokenLifecycleManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Endpoints {
    client_id: String,
    token_endpoint: String,
}

#[derive(Default)]
struct RefreshGate {
    generation: u64,
    last_outcome: Option<Result<TokenResponse>>,
}

/// Stores, restores and refreshes the token set.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use keycloak_session::auth::lifecycle::TokenLifecycleManager;
/// use keycloak_session::auth::token_store::MemoryStore;
///
/// # async fn example() -> keycloak_session::Result<()> {
/// let manager = TokenLifecycleManager::new(reqwest::Client::new(), Arc::new(MemoryStore::new()));
/// manager
///     .init("my-app", "https://sso.example.com/realms/demo/protocol/openid-connect/token")
///     .await;
/// let refreshed = manager.refresh_tokens().await?;
/// println!("new token type: {:?}", refreshed.token_type);
/// # Ok(())
/// # }
/// ```
pub struct TokenLifecycleManager {
    http: reqwest::Client,
    store: Arc<dyn SecureStore>,
    endpoints: RwLock<Option<Endpoints>>,
    refresh_gate: Mutex<RefreshGate>,
    refresh_generation: AtomicU64,
}

impl TokenLifecycleManager {
    /// Creates an uninitialised manager over `store`.
    pub fn new(http: reqwest::Client, store: Arc<dyn SecureStore>) -> Self {
        Self {
            http,
            store,
            endpoints: RwLock::new(None),
            refresh_gate: Mutex::new(RefreshGate::default()),
            refresh_generation: AtomicU64::new(0),
        }
    }

    /// Records the client id and token endpoint. Last write wins.
    pub async fn init(&self, client_id: impl Into<String>, token_endpoint: impl Into<String>) {
        let endpoints = Endpoints {
            client_id: client_id.into(),
            token_endpoint: token_endpoint.into(),
        };
        tracing::debug!(
            client_id = %endpoints.client_id,
            token_endpoint = %endpoints.token_endpoint,
            "token lifecycle manager initialised"
        );
        *self.endpoints.write().await = Some(endpoints);
    }

    /// Forgets the client id and token endpoint. Stored tokens are untouched.
    pub async fn teardown(&self) {
        *self.endpoints.write().await = None;
    }

    /// Returns `true` when both a client id and a token endpoint are known.
    pub async fn is_initialized(&self) -> bool {
        self.endpoints().await.is_ok()
    }

    pub async fn client_id(&self) -> Option<String> {
        self.endpoints().await.ok().map(|e| e.client_id)
    }

    pub async fn token_endpoint(&self) -> Option<String> {
        self.endpoints().await.ok().map(|e| e.token_endpoint)
    }

    async fn endpoints(&self) -> Result<Endpoints> {
        match self.endpoints.read().await.as_ref() {
            Some(e) if !e.client_id.is_empty() && !e.token_endpoint.is_empty() => Ok(e.clone()),
            Some(e) if e.client_id.is_empty() => Err(SessionError::NotInitialized(
                "client id is empty".to_string(),
            )),
            Some(_) => Err(SessionError::NotInitialized(
                "token endpoint is empty".to_string(),
            )),
            None => Err(SessionError::NotInitialized(
                "token lifecycle manager has no client id or token endpoint".to_string(),
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Store access
    // -----------------------------------------------------------------------

    /// Writes the tokens in `tokens` to the store, overwriting prior values.
    ///
    /// Slots the response does not carry are deleted so the stored set
    /// always mirrors the latest response.
    pub async fn store_tokens(&self, tokens: &TokenResponse) -> Result<()> {
        self.store.set(ACCESS_TOKEN_KEY, &tokens.access_token).await?;
        self.write_slot(REFRESH_TOKEN_KEY, tokens.refresh_token.as_deref())
            .await?;
        self.write_slot(ID_TOKEN_KEY, tokens.id_token.as_deref())
            .await?;
        tracing::debug!("tokens persisted");
        Ok(())
    }

    async fn write_slot(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => self.store.set(key, value).await,
            None => self.store.delete(key).await,
        }
    }

    /// Reads the stored token set.
    ///
    /// Missing keys come back as `None` fields. Any storage error makes the
    /// whole result `None`, which callers treat as "no session".
    pub async fn retrieve_tokens(&self) -> Option<TokenSet> {
        match self.read_token_set().await {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read tokens from secure store");
                None
            }
        }
    }

    async fn read_token_set(&self) -> Result<TokenSet> {
        Ok(TokenSet {
            access_token: self.store.get(ACCESS_TOKEN_KEY).await?,
            refresh_token: self.store.get(REFRESH_TOKEN_KEY).await?,
            id_token: self.store.get(ID_TOKEN_KEY).await?,
        })
    }

    /// Deletes all three token entries. Absent entries are not an error.
    ///
    /// Waits for any in-flight refresh first, so the store is empty when this
    /// returns even if a refresh was racing it.
    pub async fn remove_tokens(&self) -> Result<()> {
        let mut gate = self.refresh_gate.lock().await;
        gate.last_outcome = None;
        let result = self.delete_all().await;
        tracing::debug!("stored tokens removed");
        result
    }

    async fn delete_all(&self) -> Result<()> {
        let mut first_error = None;
        for key in TOKEN_KEYS {
            if let Err(e) = self.store.delete(key).await {
                tracing::warn!(key, error = %e, "failed to delete token");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Decodes the stored access token's claims as `T`.
    ///
    /// Returns `None` when there is no access token or it cannot be decoded.
    pub async fn decode_access_token<T: DeserializeOwned>(&self) -> Option<T> {
        let access_token = self.get_access_token().await?;
        match decode_jwt_claims(&access_token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode access token");
                None
            }
        }
    }

    /// The stored access token, if any.
    pub async fn get_access_token(&self) -> Option<String> {
        self.retrieve_tokens().await?.access_token
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Exchanges the stored refresh token for a new token set.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotInitialized`] before [`init`](Self::init).
    /// - [`SessionError::NoTokens`] / [`SessionError::NoRefreshToken`] when
    ///   the store cannot be read or holds no refresh token.
    /// - [`SessionError::RefreshFailed`] on a non-2xx response; the stored
    ///   tokens have been deleted.
    /// - [`SessionError::Http`] on transport failure; the stored tokens are
    ///   kept.
    pub async fn refresh_tokens(&self) -> Result<TokenResponse> {
        let observed = self.refresh_generation.load(Ordering::Acquire);
        let mut gate = self.refresh_gate.lock().await;

        if gate.generation != observed {
            if let Some(outcome) = gate.last_outcome.clone() {
                tracing::debug!("joining outcome of concurrent token refresh");
                return outcome;
            }
        }

        let outcome = self.perform_refresh().await;
        gate.generation += 1;
        gate.last_outcome = Some(outcome.clone());
        self.refresh_generation
            .store(gate.generation, Ordering::Release);
        outcome
    }

    async fn perform_refresh(&self) -> Result<TokenResponse> {
        let endpoints = self.endpoints().await?;
        let tokens = self
            .retrieve_tokens()
            .await
            .ok_or(SessionError::NoTokens)?;
        let refresh_token = tokens.refresh_token.ok_or(SessionError::NoRefreshToken)?;

        tracing::debug!(token_endpoint = %endpoints.token_endpoint, "refreshing access token");

        let resp = self
            .http
            .post(&endpoints.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", endpoints.client_id.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                "token refresh rejected; clearing stored tokens"
            );
            if let Err(e) = self.delete_all().await {
                tracing::warn!(error = %e, "failed to clear tokens after rejected refresh");
            }
            return Err(SessionError::RefreshFailed {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        let tokens: TokenResponse = resp.json().await.map_err(|e| {
            SessionError::InvalidResponse(format!("failed to parse token response: {e}"))
        })?;
        self.store_tokens(&tokens).await?;
        tracing::info!("access token refreshed");
        Ok(tokens)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
