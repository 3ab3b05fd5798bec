//! Access token claim decoding
//!
//! Keycloak access tokens are JWTs. The payload segment is decoded locally to
//! learn the token's expiry; the signature is not checked here because the
//! resource server verifies it on every call.

use std::collections::HashMap;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Standard and Keycloak-specific claims of an access token.
///
/// Claims not modelled here are kept in [`extra`](Self::extra).
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use keycloak_session::auth::claims::AccessTokenClaims;
///
/// let claims: AccessTokenClaims =
///     serde_json::from_str(r#"{"exp": 1700000000, "sub": "user-1"}"#).unwrap();
/// let before = Utc.timestamp_opt(1_699_999_999, 0).unwrap();
/// let after = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
/// assert!(!claims.is_expired_at(before));
/// assert!(claims.is_expired_at(after));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Expiry, in Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued-at, in Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Subject (user id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issuer URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Authorized party (the client the token was issued to).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Space-separated granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Keycloak session id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Claims not modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl AccessTokenClaims {
    /// The `exp` claim as a UTC timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Returns `true` when `exp` is at or before `now`.
    ///
    /// A token without an `exp` claim never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.exp {
            Some(exp) => exp <= now.timestamp(),
            None => false,
        }
    }

    /// Returns `true` when `exp` is in the past.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Decodes the payload segment of a compact JWT into `T`.
///
/// # Errors
///
/// Returns [`SessionError::InvalidResponse`] when the token is not a
/// three-segment JWT or the payload is not base64url-encoded JSON matching
/// `T`.
///
/// # Examples
///
/// ```
/// use keycloak_session::auth::claims::{decode_jwt_claims, AccessTokenClaims};
///
/// // {"alg":"none"} . {"sub":"u1","exp":42} . (empty signature)
/// let jwt = "eyJhbGciOiJub25lIn0.eyJzdWIiOiJ1MSIsImV4cCI6NDJ9.";
/// let claims: AccessTokenClaims = decode_jwt_claims(jwt).unwrap();
/// assert_eq!(claims.sub.as_deref(), Some("u1"));
/// assert_eq!(claims.exp, Some(42));
/// ```
pub fn decode_jwt_claims<T: DeserializeOwned>(token: &str) -> Result<T> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(SessionError::InvalidResponse(format!(
            "access token is not a JWT: expected 3 segments, found {}",
            segments.len()
        )));
    }

    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| SessionError::InvalidResponse(format!("invalid JWT payload encoding: {e}")))?;

    serde_json::from_slice(&payload)
        .map_err(|e| SessionError::InvalidResponse(format!("invalid JWT claims: {e}")))
}
