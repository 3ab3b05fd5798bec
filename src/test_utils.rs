//! Test utilities for keycloak-session
//!
//! Builders for JWTs, token endpoint bodies and discovery documents, plus a
//! secure store that always fails.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine as _;

use crate::auth::discovery::DiscoveryDocument;
use crate::auth::token_store::SecureStore;
use crate::error::{Result, SessionError};

/// Encodes `claims` as an unsigned compact JWT (`alg: none`).
pub fn unsigned_jwt(claims: &serde_json::Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = engine.encode(claims.to_string());
    format!("{header}.{payload}.")
}

/// A Keycloak-shaped token endpoint response body.
pub fn token_response_json(access: &str, refresh: &str, id: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "expires_in": 300,
        "refresh_expires_in": 1800,
        "refresh_token": refresh,
        "token_type": "Bearer",
        "id_token": id,
        "scope": "openid profile",
        "session_state": "session-1",
        "not-before-policy": 0
    })
}

/// A discovery document whose endpoints live under `base`.
pub fn discovery_document(base: &str) -> DiscoveryDocument {
    DiscoveryDocument {
        issuer: base.to_string(),
        authorization_endpoint: format!("{base}/protocol/openid-connect/auth"),
        token_endpoint: format!("{base}/protocol/openid-connect/token"),
        end_session_endpoint: Some(format!("{base}/protocol/openid-connect/logout")),
        userinfo_endpoint: None,
        jwks_uri: None,
        revocation_endpoint: None,
        scopes_supported: None,
        code_challenge_methods_supported: Some(vec!["S256".to_string()]),
        extra: HashMap::new(),
    }
}

/// A [`SecureStore`] whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl SecureStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(SessionError::Storage("store unavailable".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(SessionError::Storage("store unavailable".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(SessionError::Storage("store unavailable".to_string()))
    }
}
