//! Secure token persistence
//!
//! Tokens are held as three independent string entries under fixed keys
//! ([`ACCESS_TOKEN_KEY`], [`REFRESH_TOKEN_KEY`], [`ID_TOKEN_KEY`]). The
//! entries are not written atomically, so a reader may observe a partial
//! [`TokenSet`] after an interrupted write.
//!
//! [`SecureStore`] is the seam to the host platform's credential storage.
//! Two adapters are provided:
//!
//! - [`KeyringStore`] -- the operating system's native credential store
//!   (Keychain on macOS, Secret Service on Linux, Windows Credential Manager
//!   on Windows) via the `keyring` crate.
//! - [`MemoryStore`] -- a process-local map for tests and ephemeral sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, SessionError};

/// Store key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Store key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Store key for the ID token.
pub const ID_TOKEN_KEY: &str = "idToken";

/// All token keys, in write order.
pub const TOKEN_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, ID_TOKEN_KEY];

// ---------------------------------------------------------------------------
// TokenSet
// ---------------------------------------------------------------------------

/// The three persisted token values.
///
/// Each value is independently optional. A set without both an access and a
/// refresh token is an incomplete session and is treated as signed out.
///
/// # Examples
///
/// ```
/// use keycloak_session::auth::token_store::TokenSet;
///
/// let partial = TokenSet {
///     access_token: Some("a1".to_string()),
///     refresh_token: None,
///     id_token: None,
/// };
/// assert!(!partial.is_complete());
/// assert!(!partial.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    /// Bearer credential for resource server calls.
    pub access_token: Option<String>,
    /// Credential used to obtain a new access token.
    pub refresh_token: Option<String>,
    /// OIDC identity token.
    pub id_token: Option<String>,
}

impl TokenSet {
    /// Returns `true` when both the access and refresh tokens are present.
    pub fn is_complete(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }

    /// Returns `true` when no token is present at all.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.id_token.is_none()
    }
}

// ---------------------------------------------------------------------------
// SecureStore
// ---------------------------------------------------------------------------

/// Keyed string storage backed by a secure credential store.
///
/// Implementations must report a missing key as `Ok(None)` on read and treat
/// deletion of a missing key as success.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Reads the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Deletes the value stored under `key`.
    async fn delete(&self, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// KeyringStore
// ---------------------------------------------------------------------------

/// [`SecureStore`] backed by the OS native keyring.
///
/// Every key becomes one keyring entry under a shared service name. Keyring
/// calls block, so each one runs on the blocking thread pool.
///
/// # Examples
///
/// ```no_run
/// use keycloak_session::auth::token_store::{KeyringStore, SecureStore};
///
/// # async fn example() -> keycloak_session::Result<()> {
/// let store = KeyringStore::new("keycloak-session");
/// store.set("accessToken", "eyJ...").await?;
/// assert!(store.get("accessToken").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Creates a store that namespaces its entries under `service`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// The keyring service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(keyring::Entry) -> Result<T> + Send + 'static,
    {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key)?;
            op(entry)
        })
        .await
        .map_err(|e| SessionError::Storage(format!("keyring task failed: {e}")))?
    }
}

#[async_trait]
impl SecureStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entry(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        self.with_entry(key, move |entry| {
            entry.set_password(&value)?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.with_entry(key, |entry| match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Process-local [`SecureStore`].
///
/// Values do not survive the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SecureStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
