//! Browser authorization request
//!
//! [`AuthorizationRequester`] is the seam between the coordinator and
//! whatever drives the user through Keycloak's login page. It yields an
//! [`AuthorizationGrant`] (code plus PKCE verifier) ready for exchange.
//!
//! [`LoopbackAuthorizer`] is the implementation for desktop and CLI hosts:
//!
//! 1. Generate a PKCE `S256` pair and a CSRF `state` value.
//! 2. Bind a TCP listener on the host and port of the configured redirect URI.
//! 3. Print the authorization URL and try to open it in the system browser.
//! 4. Accept the redirect, validate `state`, and extract `code`.

use std::collections::HashMap;

use async_trait::async_trait;
use oauth2::{CsrfToken, PkceCodeChallenge};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use url::Url;

use crate::auth::discovery::DiscoveryDocument;
use crate::auth::session::AuthorizationGrant;
use crate::config::ClientConfig;
use crate::error::{Result, SessionError};

/// Obtains an authorization code from the identity provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthorizationRequester: Send + Sync {
    /// Runs the interactive authorization request and returns the resulting
    /// code together with the PKCE verifier used to request it.
    async fn request_authorization(
        &self,
        discovery: &DiscoveryDocument,
        client: &ClientConfig,
    ) -> Result<AuthorizationGrant>;
}

/// Builds the authorization endpoint URL for an authorization code request
/// with PKCE.
///
/// # Examples
///
/// ```
/// use keycloak_session::auth::authorize::build_authorization_url;
/// use keycloak_session::auth::discovery::DiscoveryDocument;
/// use keycloak_session::config::ClientConfig;
///
/// let discovery: DiscoveryDocument = serde_json::from_value(serde_json::json!({
///     "issuer": "https://sso.example.com/realms/demo",
///     "authorization_endpoint": "https://sso.example.com/realms/demo/protocol/openid-connect/auth",
///     "token_endpoint": "https://sso.example.com/realms/demo/protocol/openid-connect/token"
/// }))
/// .unwrap();
///
/// let url = build_authorization_url(&discovery, &ClientConfig::default(), "st", "ch").unwrap();
/// assert!(url.as_str().contains("code_challenge_method=S256"));
/// ```
pub fn build_authorization_url(
    discovery: &DiscoveryDocument,
    client: &ClientConfig,
    state: &str,
    code_challenge: &str,
) -> Result<Url> {
    let mut url = Url::parse(&discovery.authorization_endpoint).map_err(|e| {
        SessionError::Authorization(format!("invalid authorization endpoint URL: {e}"))
    })?;

    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &client.client_id)
        .append_pair("redirect_uri", &client.sign_in_redirect_uri)
        .append_pair("scope", &client.scope_param())
        .append_pair("state", state)
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", "S256");

    Ok(url)
}

// ---------------------------------------------------------------------------
// LoopbackAuthorizer
// ---------------------------------------------------------------------------

/// Completes the authorization request in the system browser and captures
/// the redirect on a loopback listener.
///
/// The client's `sign_in_redirect_uri` must be an `http` URI on a loopback
/// host (`127.0.0.1`, `[::1]` or `localhost`) with an explicit port.
#[derive(Debug, Clone)]
pub struct LoopbackAuthorizer {
    open_browser: bool,
}

impl Default for LoopbackAuthorizer {
    fn default() -> Self {
        Self { open_browser: true }
    }
}

impl LoopbackAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether to launch the system browser. The URL is always printed.
    pub fn with_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }
}

#[async_trait]
impl AuthorizationRequester for LoopbackAuthorizer {
    async fn request_authorization(
        &self,
        discovery: &DiscoveryDocument,
        client: &ClientConfig,
    ) -> Result<AuthorizationGrant> {
        if !discovery.supports_s256() {
            return Err(SessionError::Authorization(
                "identity provider does not support PKCE S256".to_string(),
            ));
        }

        let redirect = Url::parse(&client.sign_in_redirect_uri).map_err(|e| {
            SessionError::Config(format!("invalid sign-in redirect URI: {e}"))
        })?;
        let bind_addr = loopback_bind_address(&redirect)?;

        let listener = TcpListener::bind(bind_addr.as_str()).await.map_err(|e| {
            SessionError::Authorization(format!("failed to bind redirect listener on {bind_addr}: {e}"))
        })?;

        let (code_challenge, code_verifier) = PkceCodeChallenge::new_random_sha256();
        let state = CsrfToken::new_random();
        let auth_url =
            build_authorization_url(discovery, client, state.secret(), code_challenge.as_str())?;

        eprintln!(
            "Open the following URL in your browser to sign in:\n{}",
            auth_url
        );
        if self.open_browser {
            try_open_browser(auth_url.as_str());
        }

        let authorization_code =
            accept_callback(&listener, redirect.path(), state.secret()).await?;

        Ok(AuthorizationGrant {
            authorization_code,
            code_verifier: code_verifier.secret().to_string(),
        })
    }
}

/// Resolves the `host:port` to listen on for `redirect`.
fn loopback_bind_address(redirect: &Url) -> Result<String> {
    if redirect.scheme() != "http" {
        return Err(SessionError::Config(format!(
            "loopback redirect URI must use http, got {}",
            redirect.scheme()
        )));
    }

    let host = match redirect.host_str() {
        Some("localhost") | Some("127.0.0.1") => "127.0.0.1",
        Some("[::1]") => "[::1]",
        other => {
            return Err(SessionError::Config(format!(
                "redirect URI host must be a loopback address, got {}",
                other.unwrap_or("<none>")
            )))
        }
    };

    let port = redirect.port().ok_or_else(|| {
        SessionError::Config("loopback redirect URI must include a port".to_string())
    })?;

    Ok(format!("{host}:{port}"))
}

/// Attempts to open `url` in the user's default browser.
///
/// Failures are ignored; the URL has already been printed.
fn try_open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    let opener = Some("open");
    #[cfg(target_os = "linux")]
    let opener = Some("xdg-open");
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    let opener: Option<&str> = None;

    if let Some(opener) = opener {
        if let Err(e) = std::process::Command::new(opener).arg(url).spawn() {
            tracing::debug!(error = %e, "could not launch browser");
        }
    }
}

const SUCCESS_PAGE: &str = "Sign-in complete. You may close this tab.";

/// Accepts connections on `listener` until one arrives for `callback_path`,
/// then validates its `state` against `expected_state` and returns `code`.
///
/// Requests for other paths (e.g. `/favicon.ico`) receive a `404` and are
/// skipped.
pub(crate) async fn accept_callback(
    listener: &TcpListener,
    callback_path: &str,
    expected_state: &str,
) -> Result<String> {
    loop {
        let (mut stream, _peer) = listener.accept().await.map_err(|e| {
            SessionError::Authorization(format!("failed to accept redirect connection: {e}"))
        })?;

        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);

        let mut request_line = String::new();
        reader.read_line(&mut request_line).await.map_err(|e| {
            SessionError::Authorization(format!("failed to read redirect request: {e}"))
        })?;

        // Drain headers up to the blank line.
        let mut header = String::new();
        loop {
            header.clear();
            let read = reader.read_line(&mut header).await.map_err(|e| {
                SessionError::Authorization(format!("failed to read redirect request: {e}"))
            })?;
            if read == 0 || header.trim_end().is_empty() {
                break;
            }
        }

        // "GET /callback?code=...&state=... HTTP/1.1"
        let target = request_line.split_whitespace().nth(1).unwrap_or("/");
        let url = Url::parse("http://localhost")
            .and_then(|base| base.join(target))
            .map_err(|e| SessionError::Authorization(format!("malformed redirect target: {e}")))?;

        if url.path() != callback_path {
            write_response(&mut writer, "404 Not Found", "Not found").await;
            continue;
        }

        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let outcome = callback_outcome(&params, expected_state);
        let page = match &outcome {
            Ok(_) => SUCCESS_PAGE.to_string(),
            Err(e) => format!("Sign-in failed: {e}"),
        };
        let status = if outcome.is_ok() { "200 OK" } else { "400 Bad Request" };
        write_response(&mut writer, status, &page).await;
        return outcome;
    }
}

fn callback_outcome(params: &HashMap<String, String>, expected_state: &str) -> Result<String> {
    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map(|d| format!(": {d}"))
            .unwrap_or_default();
        return Err(SessionError::Authorization(format!(
            "identity provider returned {error}{description}"
        )));
    }

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(SessionError::Authorization(
            "state mismatch in authorization callback".to_string(),
        ));
    }

    params
        .get("code")
        .cloned()
        .ok_or_else(|| {
            SessionError::Authorization("authorization code missing from callback".to_string())
        })
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = writer.write_all(response.as_bytes()).await {
        tracing::debug!(error = %e, "failed to write redirect response");
    }
    let _ = writer.shutdown().await;
}
