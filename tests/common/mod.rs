use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use keycloak_session::auth::authorize::AuthorizationRequester;
use keycloak_session::auth::discovery::DiscoveryDocument;
use keycloak_session::auth::lifecycle::TokenLifecycleManager;
use keycloak_session::auth::token_store::{MemoryStore, SecureStore};
use keycloak_session::config::ClientConfig;
use keycloak_session::{AuthorizationGrant, Result, SessionError};

pub const CLIENT_ID: &str = "test-client";
pub const REALM_PATH: &str = "/realms/demo";
pub const TOKEN_PATH: &str = "/realms/demo/protocol/openid-connect/token";
pub const LOGOUT_PATH: &str = "/realms/demo/protocol/openid-connect/logout";

/// Realm issuer URL served by `server`.
#[allow(dead_code)]
pub fn issuer(server: &MockServer) -> String {
    format!("{}{}", server.uri(), REALM_PATH)
}

/// Token endpoint URL served by `server`.
#[allow(dead_code)]
pub fn token_endpoint(server: &MockServer) -> String {
    format!("{}{}", server.uri(), TOKEN_PATH)
}

/// Keycloak-shaped discovery document for the realm on `server`.
#[allow(dead_code)]
pub fn discovery_json(server: &MockServer) -> serde_json::Value {
    let issuer = issuer(server);
    serde_json::json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/protocol/openid-connect/auth"),
        "token_endpoint": format!("{issuer}/protocol/openid-connect/token"),
        "end_session_endpoint": format!("{issuer}/protocol/openid-connect/logout"),
        "userinfo_endpoint": format!("{issuer}/protocol/openid-connect/userinfo"),
        "jwks_uri": format!("{issuer}/protocol/openid-connect/certs"),
        "code_challenge_methods_supported": ["plain", "S256"]
    })
}

#[allow(dead_code)]
pub fn discovery_document(server: &MockServer) -> DiscoveryDocument {
    serde_json::from_value(discovery_json(server)).expect("valid discovery document")
}

/// Mounts the discovery endpoint on `server`.
#[allow(dead_code)]
pub async fn mount_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("{REALM_PATH}/.well-known/openid-configuration")))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_json(server)))
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub fn client_config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        client_id: CLIENT_ID.to_string(),
        issuer: issuer(server),
        scopes: vec!["openid".to_string(), "profile".to_string()],
        sign_in_redirect_uri: "http://127.0.0.1:8765/callback".to_string(),
    }
}

/// A Keycloak-shaped token endpoint response body.
#[allow(dead_code)]
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

/// Encodes `claims` as an unsigned compact JWT.
#[allow(dead_code)]
pub fn unsigned_jwt(claims: &serde_json::Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = engine.encode(claims.to_string());
    format!("{header}.{payload}.")
}

/// An access token JWT whose `exp` is `offset_secs` from now.
#[allow(dead_code)]
pub fn access_token_expiring_in(offset_secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + offset_secs;
    unsigned_jwt(&serde_json::json!({
        "exp": exp,
        "sub": "user-1",
        "preferred_username": "alice"
    }))
}

/// Writes the three token entries straight into `store`.
#[allow(dead_code)]
pub async fn seed_tokens(store: &dyn SecureStore, access: &str, refresh: &str, id: &str) {
    store.set("accessToken", access).await.expect("seed access");
    store.set("refreshToken", refresh).await.expect("seed refresh");
    store.set("idToken", id).await.expect("seed id");
}

/// A lifecycle manager over a fresh memory store.
#[allow(dead_code)]
pub fn lifecycle_with_store() -> (Arc<TokenLifecycleManager>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let manager = Arc::new(TokenLifecycleManager::new(
        reqwest::Client::new(),
        store.clone(),
    ));
    (manager, store)
}

/// A [`SecureStore`] whose every operation fails.
#[allow(dead_code)]
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

/// An [`AuthorizationRequester`] that hands out a fixed grant.
#[allow(dead_code)]
pub struct StaticGrant(pub AuthorizationGrant);

#[async_trait]
impl AuthorizationRequester for StaticGrant {
    async fn request_authorization(
        &self,
        _discovery: &DiscoveryDocument,
        _client: &ClientConfig,
    ) -> Result<AuthorizationGrant> {
        Ok(self.0.clone())
    }
}

/// Writes `contents` to `config.yaml` in a fresh temp dir.
///
/// The returned [`tempfile::TempDir`] must outlive the path.
#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, contents).expect("write config file");
    (dir, path.to_string_lossy().into_owned())
}
