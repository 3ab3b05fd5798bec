//! Configuration management for keycloak-session
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SessionError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// OIDC client registration
    #[serde(default)]
    pub client: ClientConfig,
    /// Token storage backend
    #[serde(default)]
    pub storage: StorageConfig,
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,
}

/// OIDC client registration for a Keycloak realm
///
/// Immutable for the lifetime of a session once handed to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Public client id registered in the realm
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Realm issuer URL, e.g. `https://sso.example.com/realms/demo`
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Scopes requested at sign-in
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Redirect URI registered for the client
    #[serde(default = "default_redirect_uri")]
    pub sign_in_redirect_uri: String,
}

fn default_client_id() -> String {
    "keycloak-session".to_string()
}

fn default_issuer() -> String {
    "http://localhost:8080/realms/master".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "profile".to_string(),
        "offline_access".to_string(),
    ]
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:8765/callback".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            issuer: default_issuer(),
            scopes: default_scopes(),
            sign_in_redirect_uri: default_redirect_uri(),
        }
    }
}

impl ClientConfig {
    /// Scopes joined into the space-separated `scope` parameter.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Where tokens are persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// OS native credential store
    #[default]
    Keyring,
    /// Process memory only; tokens are lost on exit
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(SessionError::Config(format!(
                "Invalid storage backend: {other}. Must be one of: keyring, memory"
            ))),
        }
    }
}

/// Token storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Keyring service name the token entries are filed under
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_service_name() -> String {
    "keycloak-session".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            service_name: default_service_name(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Base URL that relative API paths resolve against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command line, for `--issuer`/`--client-id` style overrides
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| SessionError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Default location of the configuration file in the user's config dir
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "keycloak-session", "keycloak-session")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn apply_env_vars(&mut self) {
        if let Ok(issuer) = std::env::var("KEYCLOAK_SESSION_ISSUER") {
            self.client.issuer = issuer;
        }

        if let Ok(client_id) = std::env::var("KEYCLOAK_SESSION_CLIENT_ID") {
            self.client.client_id = client_id;
        }

        if let Ok(redirect_uri) = std::env::var("KEYCLOAK_SESSION_REDIRECT_URI") {
            self.client.sign_in_redirect_uri = redirect_uri;
        }

        if let Ok(scopes) = std::env::var("KEYCLOAK_SESSION_SCOPES") {
            self.client.scopes = scopes
                .split([',', ' '])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(base_url) = std::env::var("KEYCLOAK_SESSION_API_BASE_URL") {
            self.http.api_base_url = Some(base_url);
        }

        if let Ok(timeout) = std::env::var("KEYCLOAK_SESSION_HTTP_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.http.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid KEYCLOAK_SESSION_HTTP_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(backend) = std::env::var("KEYCLOAK_SESSION_STORAGE_BACKEND") {
            match backend.parse() {
                Ok(value) => self.storage.backend = value,
                Err(_) => tracing::warn!("Invalid storage backend: {}, keeping current", backend),
            }
        }

        if let Ok(service) = std::env::var("KEYCLOAK_SESSION_KEYRING_SERVICE") {
            self.storage.service_name = service;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(issuer) = &cli.issuer {
            self.client.issuer = issuer.clone();
        }
        if let Some(client_id) = &cli.client_id {
            self.client.client_id = client_id.clone();
        }
        if cli.memory_store {
            self.storage.backend = StorageBackend::Memory;
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.client.client_id.trim().is_empty() {
            return Err(SessionError::Config(
                "client.client_id cannot be empty".to_string(),
            ));
        }

        let issuer = Url::parse(&self.client.issuer).map_err(|e| {
            SessionError::Config(format!("client.issuer is not a valid URL: {}", e))
        })?;
        if !matches!(issuer.scheme(), "http" | "https") {
            return Err(SessionError::Config(format!(
                "client.issuer must use http or https, got {}",
                issuer.scheme()
            )));
        }

        if self.client.scopes.is_empty() {
            return Err(SessionError::Config(
                "client.scopes must contain at least one scope".to_string(),
            ));
        }
        if !self.client.scopes.iter().any(|s| s == "openid") {
            tracing::warn!("client.scopes does not include 'openid'; no ID token will be issued");
        }

        Url::parse(&self.client.sign_in_redirect_uri).map_err(|e| {
            SessionError::Config(format!(
                "client.sign_in_redirect_uri is not a valid URL: {}",
                e
            ))
        })?;

        if self.storage.backend == StorageBackend::Keyring
            && self.storage.service_name.trim().is_empty()
        {
            return Err(SessionError::Config(
                "storage.service_name cannot be empty for the keyring backend".to_string(),
            ));
        }

        if self.http.timeout_seconds == 0 {
            return Err(SessionError::Config(
                "http.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if let Some(base_url) = &self.http.api_base_url {
            Url::parse(base_url).map_err(|e| {
                SessionError::Config(format!("http.api_base_url is not a valid URL: {}", e))
            })?;
        }

        Ok(())
    }
}
