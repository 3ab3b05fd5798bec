//! Authenticated request gateway
//!
//! [`AuthenticatedClient`] wraps a `reqwest::Client` so that every request
//! carries the current access token as a bearer credential. A `401
//! Unauthorized` answer to a request that has not been retried yet triggers
//! one token refresh and one replay of the same request. A refresh failure
//! is returned in place of the `401`.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::auth::lifecycle::TokenLifecycleManager;
use crate::error::{Result, SessionError};

/// Replayable parts of one outgoing request plus its retry marker.
#[derive(Debug, Clone)]
struct RequestContext {
    method: Method,
    url: Url,
    body: Option<Value>,
    retried: bool,
}

impl RequestContext {
    fn new(method: Method, url: Url, body: Option<Value>) -> Self {
        Self {
            method,
            url,
            body,
            retried: false,
        }
    }
}

/// HTTP client that authenticates with the stored access token.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use keycloak_session::auth::lifecycle::TokenLifecycleManager;
/// use keycloak_session::auth::token_store::MemoryStore;
/// use keycloak_session::gateway::AuthenticatedClient;
///
/// # async fn example() -> keycloak_session::Result<()> {
/// let http = reqwest::Client::new();
/// let lifecycle = Arc::new(TokenLifecycleManager::new(http.clone(), Arc::new(MemoryStore::new())));
/// let client = AuthenticatedClient::new(http, lifecycle)
///     .with_base_url(url::Url::parse("https://api.example.com").unwrap());
///
/// let profile: serde_json::Value = client.get("/me").await?;
/// println!("{profile}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    lifecycle: Arc<TokenLifecycleManager>,
    base_url: Option<Url>,
}

impl AuthenticatedClient {
    pub fn new(http: reqwest::Client, lifecycle: Arc<TokenLifecycleManager>) -> Self {
        Self {
            http,
            lifecycle,
            base_url: None,
        }
    }

    /// Resolves relative request paths against `base_url`.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Resolves `path` to an absolute URL.
    ///
    /// Absolute URLs pass through; anything else is appended to the base URL.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(path) {
            return Ok(url);
        }
        let base = self.base_url.as_ref().ok_or_else(|| {
            SessionError::Config(format!(
                "relative path {path} requires a base URL (http.api_base_url)"
            ))
        })?;
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| SessionError::Config(format!("invalid URL {joined}: {e}")))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::POST, path, Some(encode_body(body)?))
            .await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::PUT, path, Some(encode_body(body)?))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::DELETE, path, None).await
    }

    /// Sends a request with an optional JSON body and decodes the JSON
    /// response body as `T`.
    ///
    /// Empty response bodies decode from `null`, so `T = ()` or
    /// `T = Option<_>` suit endpoints that answer `204 No Content`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::HttpStatus`] for any non-2xx final response,
    ///   including a `401` that persists after the refresh-and-retry.
    /// - Any error from [`TokenLifecycleManager::refresh_tokens`] when the
    ///   refresh triggered by a `401` fails.
    /// - [`SessionError::InvalidResponse`] when the body does not decode.
    #[tracing::instrument(skip_all, fields(method = %method, path = %path))]
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let url = self.resolve(path)?;
        let response = self.execute(RequestContext::new(method, url, body)).await?;
        decode_response(response).await
    }

    async fn execute(&self, mut ctx: RequestContext) -> Result<reqwest::Response> {
        loop {
            let response = self.send(&ctx).await?;
            if response.status() != StatusCode::UNAUTHORIZED || ctx.retried {
                return Ok(response);
            }

            tracing::debug!("request unauthorized; refreshing access token and retrying once");
            ctx.retried = true;
            self.lifecycle.refresh_tokens().await?;
        }
    }

    async fn send(&self, ctx: &RequestContext) -> Result<reqwest::Response> {
        let mut req = self.http.request(ctx.method.clone(), ctx.url.clone());
        if let Some(token) = self.lifecycle.get_access_token().await {
            req = req.bearer_auth(token);
        }
        if let Some(body) = &ctx.body {
            req = req.json(body);
        }
        Ok(req.send().await?)
    }
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Value> {
    serde_json::to_value(body)
        .map_err(|e| SessionError::Http(format!("failed to encode request body: {e}")))
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), "request failed");
        return Err(SessionError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return serde_json::from_value(Value::Null).map_err(|e| {
            SessionError::InvalidResponse(format!("empty response body: {e}"))
        });
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| SessionError::InvalidResponse(format!("failed to decode response: {e}")))
}
