//! OpenID Connect discovery
//!
//! Fetches the provider metadata document from
//! `<issuer>/.well-known/openid-configuration`. For a Keycloak realm the
//! issuer is `https://<host>/realms/<realm>`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SessionError};

/// OpenID Provider metadata.
///
/// Fields not modelled explicitly are preserved in [`extra`](Self::extra).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// The issuer identifier URI.
    pub issuer: String,

    /// The URL of the authorization endpoint.
    pub authorization_endpoint: String,

    /// The URL of the token endpoint.
    pub token_endpoint: String,

    /// The URL of the RP-initiated logout endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// PKCE challenge methods the provider supports (e.g. `["S256"]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Additional metadata fields not explicitly modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl DiscoveryDocument {
    /// Returns `false` only when the provider advertises challenge methods
    /// and `S256` is not among them.
    pub fn supports_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .map_or(true, |methods| methods.iter().any(|m| m == "S256"))
    }
}

/// Builds the discovery URL for `issuer` by appending
/// `/.well-known/openid-configuration` to the issuer path.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use keycloak_session::auth::discovery::discovery_url;
///
/// let issuer = Url::parse("https://sso.example.com/realms/demo/").unwrap();
/// assert_eq!(
///     discovery_url(&issuer).as_str(),
///     "https://sso.example.com/realms/demo/.well-known/openid-configuration"
/// );
/// ```
pub fn discovery_url(issuer: &Url) -> Url {
    let mut url = issuer.clone();
    let path = format!(
        "{}/.well-known/openid-configuration",
        issuer.path().trim_end_matches('/')
    );
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Fetches and parses the discovery document for `issuer`.
///
/// # Errors
///
/// Returns [`SessionError::Discovery`] if the issuer is not a valid URL, the
/// request fails, the provider answers with a non-2xx status, or the body is
/// not a discovery document.
pub async fn fetch_discovery_document(
    http: &reqwest::Client,
    issuer: &str,
) -> Result<DiscoveryDocument> {
    let issuer_url = Url::parse(issuer)
        .map_err(|e| SessionError::Discovery(format!("invalid issuer URL {issuer}: {e}")))?;
    let url = discovery_url(&issuer_url);
    tracing::debug!(%url, "fetching discovery document");

    let resp = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| SessionError::Discovery(format!("request to {url} failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SessionError::Discovery(format!(
            "{url} returned {status}: {body}"
        )));
    }

    let document: DiscoveryDocument = resp
        .json()
        .await
        .map_err(|e| SessionError::Discovery(format!("invalid discovery document: {e}")))?;

    if document.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
        tracing::warn!(
            expected = issuer,
            advertised = %document.issuer,
            "discovery document issuer does not match configured issuer"
        );
    }

    Ok(document)
}
