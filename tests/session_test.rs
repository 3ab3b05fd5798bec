//! Session controller and discovery integration tests using wiremock
//!
//! Verifies `src/auth/discovery.rs` and `src/auth/session.rs`:
//!
//! - The discovery document is fetched from the issuer's well-known path.
//! - The authorization code exchange posts the PKCE verifier and redirect
//!   URI, and does not persist the returned tokens.
//! - Exchange failures surface as `ExchangeFailed`.
//! - End-session posts the refresh token and reports non-2xx answers.

mod common;

use std::sync::Arc;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    client_config, discovery_document, issuer, lifecycle_with_store, mount_discovery, seed_tokens,
    token_response_json, LOGOUT_PATH, TOKEN_PATH,
};
use keycloak_session::auth::discovery::fetch_discovery_document;
use keycloak_session::auth::token_store::MemoryStore;
use keycloak_session::{AuthorizationGrant, SessionController, SessionError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn controller(server: &MockServer) -> (SessionController, Arc<MemoryStore>) {
    let (lifecycle, store) = lifecycle_with_store();
    let controller = SessionController::new(reqwest::Client::new(), lifecycle);
    controller
        .init(
            Arc::new(discovery_document(server)),
            Arc::new(client_config(server)),
        )
        .await;
    (controller, store)
}

fn grant() -> AuthorizationGrant {
    AuthorizationGrant {
        authorization_code: "code-1".to_string(),
        code_verifier: "verifier-1".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fetch_discovery_document() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    let document = fetch_discovery_document(&reqwest::Client::new(), &issuer(&server))
        .await
        .expect("discovery succeeds");

    assert_eq!(document.issuer, issuer(&server));
    assert_eq!(document.token_endpoint, format!("{}{}", server.uri(), TOKEN_PATH));
    assert_eq!(
        document.end_session_endpoint,
        Some(format!("{}{}", server.uri(), LOGOUT_PATH))
    );
    assert!(document.supports_s256());
}

#[tokio::test]
async fn test_fetch_discovery_document_not_found() {
    let server = MockServer::start().await;

    let err = fetch_discovery_document(&reqwest::Client::new(), &issuer(&server))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Discovery(_)));
}

// ---------------------------------------------------------------------------
// Code exchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_exchange_posts_code_and_verifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=code-1"))
        .and(body_string_contains("code_verifier=verifier-1"))
        .and(body_string_contains("client_id=test-client"))
        .and(body_string_contains(
            "redirect_uri=http%3A%2F%2F127.0.0.1%3A8765%2Fcallback",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response_json("a1", "r1", "i1")))
        .expect(1)
        .mount(&server)
        .await;

    let (controller, store) = controller(&server).await;
    let tokens = controller
        .request_access_token(&grant())
        .await
        .expect("exchange succeeds");

    assert_eq!(tokens.access_token, "a1");
    assert_eq!(tokens.refresh_token.as_deref(), Some("r1"));
    assert_eq!(tokens.id_token.as_deref(), Some("i1"));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_exchange_rejected_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let (controller, _store) = controller(&server).await;
    let err = controller.request_access_token(&grant()).await.unwrap_err();
    match err {
        SessionError::ExchangeFailed(message) => assert!(message.contains("invalid_grant")),
        other => panic!("expected ExchangeFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exchange_unparseable_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let (controller, _store) = controller(&server).await;
    let err = controller.request_access_token(&grant()).await.unwrap_err();
    assert!(matches!(err, SessionError::ExchangeFailed(_)));
}

// ---------------------------------------------------------------------------
// End session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_end_session_posts_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGOUT_PATH))
        .and(body_string_contains("client_id=test-client"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (controller, store) = controller(&server).await;
    seed_tokens(store.as_ref(), "a1", "r1", "i1").await;

    controller.end_session().await.expect("end session succeeds");
    assert_eq!(store.len().await, 3);
}

#[tokio::test]
async fn test_end_session_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGOUT_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid refresh token"))
        .expect(1)
        .mount(&server)
        .await;

    let (controller, store) = controller(&server).await;
    seed_tokens(store.as_ref(), "a1", "r1", "i1").await;

    let err = controller.end_session().await.unwrap_err();
    assert_eq!(
        err,
        SessionError::EndSessionFailed {
            status: 400,
            status_text: "Bad Request".to_string(),
            body: "invalid refresh token".to_string(),
        }
    );
    assert_eq!(store.len().await, 3);
}
