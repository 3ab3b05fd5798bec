/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint. Every
handler receives an [`AuthCoordinator`] whose startup routine has already
run:

- `login`   -- browser sign-in
- `logout`  -- end the Keycloak session and clear local tokens
- `refresh` -- exchange the refresh token
- `status`  -- report the restored session
- `request` -- authenticated API call
*/

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use crate::auth::claims::AccessTokenClaims;
use crate::auth::token_store::{KeyringStore, MemoryStore, SecureStore};
use crate::config::{Config, StorageBackend};
use crate::coordinator::{AuthCoordinator, AuthState};

/// Builds the HTTP client described by `config.http`.
pub fn build_http_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_seconds))
        .build()
        .context("Failed to build HTTP client")
}

/// Builds the configured secure store.
pub fn build_store(config: &Config) -> Arc<dyn SecureStore> {
    match config.storage.backend {
        StorageBackend::Keyring => Arc::new(KeyringStore::new(config.storage.service_name.clone())),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    }
}

/// Builds the coordinator for `config` and runs its startup routine.
pub async fn start_coordinator(config: &Config) -> anyhow::Result<AuthCoordinator> {
    let http = build_http_client(config)?;
    let coordinator = AuthCoordinator::new(http, config.client.clone(), build_store(config));
    let state = coordinator.start().await;
    if let Some(error) = &state.error {
        tracing::warn!("Session restore reported an error: {}", error);
    }
    Ok(coordinator)
}

// Sign-in handler
pub mod login {
    use super::*;
    use crate::auth::authorize::LoopbackAuthorizer;

    /// Sign in through the browser unless a valid session was restored
    pub async fn run_login(coordinator: &AuthCoordinator, no_browser: bool) -> anyhow::Result<()> {
        if coordinator.state().is_authenticated {
            println!("Already signed in.");
            return Ok(());
        }

        let authorizer = LoopbackAuthorizer::new().with_browser(!no_browser);
        coordinator
            .login(&authorizer)
            .await
            .context("Sign-in failed")?;
        println!("Signed in.");
        Ok(())
    }
}

// Sign-out handler
pub mod logout {
    use super::*;

    /// End the session; local tokens are cleared even if the server call fails
    pub async fn run_logout(coordinator: &AuthCoordinator) -> anyhow::Result<()> {
        let outcome = coordinator.logout().await;
        match outcome.error() {
            None => println!("Signed out."),
            Some(error) => {
                eprintln!("Local tokens cleared, but ending the server session failed: {}", error)
            }
        }
        Ok(())
    }
}

// Token refresh handler
pub mod refresh {
    use super::*;

    pub async fn run_refresh(coordinator: &AuthCoordinator) -> anyhow::Result<()> {
        coordinator
            .refresh_access_token()
            .await
            .context("Token refresh failed")?;
        println!("Access token refreshed.");
        Ok(())
    }
}

// Session status handler
pub mod status {
    use super::*;

    /// Session summary printed by `status`
    #[derive(Debug, Serialize)]
    pub struct StatusReport {
        #[serde(flatten)]
        pub state: AuthState,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub subject: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub username: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub expires_at: Option<String>,
    }

    /// Collect the status report for `coordinator`
    pub async fn collect(coordinator: &AuthCoordinator) -> StatusReport {
        let state = coordinator.state();
        let claims = if state.is_authenticated {
            coordinator
                .lifecycle()
                .decode_access_token::<AccessTokenClaims>()
                .await
        } else {
            None
        };

        StatusReport {
            state,
            subject: claims.as_ref().and_then(|c| c.sub.clone()),
            username: claims.as_ref().and_then(|c| c.preferred_username.clone()),
            expires_at: claims
                .as_ref()
                .and_then(AccessTokenClaims::expires_at)
                .map(|t| t.to_rfc3339()),
        }
    }

    pub async fn run_status(coordinator: &AuthCoordinator, json: bool) -> anyhow::Result<()> {
        let report = collect(coordinator).await;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        if report.state.is_authenticated {
            let who = report
                .username
                .as_deref()
                .or(report.subject.as_deref())
                .unwrap_or("unknown user");
            println!("Signed in as {}", who);
            if let Some(expires_at) = &report.expires_at {
                println!("Access token expires at {}", expires_at);
            }
        } else {
            println!("Not signed in.");
        }
        if let Some(error) = &report.state.error {
            println!("Last error: {}", error);
        }
        Ok(())
    }
}

// Authenticated request handler
pub mod request {
    use super::*;
    use reqwest::Method;

    /// Send an authenticated request and print the JSON response
    pub async fn run_request(
        coordinator: &AuthCoordinator,
        config: &Config,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> anyhow::Result<()> {
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .with_context(|| format!("Invalid HTTP method: {}", method))?;
        let body = body
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .context("Request body is not valid JSON")?;

        let mut client = coordinator.client();
        if let Some(base_url) = &config.http.api_base_url {
            client = client.with_base_url(
                url::Url::parse(base_url).context("Invalid http.api_base_url")?,
            );
        }

        let response: serde_json::Value = client
            .request(method, path, body)
            .await
            .with_context(|| format!("Request to {} failed", path))?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client_from_default_config() {
        assert!(build_http_client(&Config::default()).is_ok());
    }

    #[tokio::test]
    async fn test_build_memory_store() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        let store = build_store(&config);
        store.set("accessToken", "a1").await.unwrap();
        assert_eq!(
            store.get("accessToken").await.unwrap(),
            Some("a1".to_string())
        );
    }

    #[tokio::test]
    async fn test_status_report_when_signed_out() {
        let coordinator = AuthCoordinator::new(
            reqwest::Client::new(),
            Config::default().client,
            Arc::new(MemoryStore::new()),
        );
        let report = status::collect(&coordinator).await;
        assert!(!report.state.is_authenticated);
        assert!(report.subject.is_none());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["is_authenticated"], false);
        assert!(json.get("subject").is_none());
    }
}
