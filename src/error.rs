//! Error types for keycloak-session
//!
//! This module defines the error taxonomy shared by the token lifecycle
//! manager, the session controller, the authenticated request gateway and the
//! coordinator, using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for keycloak-session operations
///
/// Transport and storage failures are captured as strings so the error is
/// `Clone`: a single refresh outcome is handed to every caller that was
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A component was used before `init` recorded its configuration
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// The token set could not be read from the secure store
    #[error("No tokens available")]
    NoTokens,

    /// The token set has no refresh token
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The token endpoint rejected a refresh request
    #[error("Token refresh failed: {status} {status_text}: {body}")]
    RefreshFailed {
        /// HTTP status code returned by the token endpoint
        status: u16,
        /// Canonical reason phrase for `status`
        status_text: String,
        /// Raw response body
        body: String,
    },

    /// Authorization code exchange failed
    #[error("Authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    /// The end-session endpoint rejected a logout request
    #[error("End session failed: {status} {status_text}: {body}")]
    EndSessionFailed {
        /// HTTP status code returned by the end-session endpoint
        status: u16,
        /// Canonical reason phrase for `status`
        status_text: String,
        /// Raw response body
        body: String,
    },

    /// OpenID Connect discovery errors
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Browser authorization request errors (callback, state mismatch, denial)
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Secure store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-success response from an authenticated API call
    #[error("Request failed with status {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// A response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Returns the HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RefreshFailed { status, .. }
            | Self::EndSessionFailed { status, .. }
            | Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<keyring::Error> for SessionError {
    fn from(err: keyring::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl From<serde_yaml::Error> for SessionError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for keycloak-session operations
///
/// Library operations return the typed [`SessionError`] so callers can match
/// on the failure class; the binary wraps these in `anyhow` for reporting.
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_display() {
        let error = SessionError::NotInitialized("token endpoint".to_string());
        assert_eq!(error.to_string(), "Not initialized: token endpoint");
    }

    #[test]
    fn test_no_tokens_display() {
        assert_eq!(SessionError::NoTokens.to_string(), "No tokens available");
        assert_eq!(
            SessionError::NoRefreshToken.to_string(),
            "No refresh token available"
        );
    }

    #[test]
    fn test_refresh_failed_display() {
        let error = SessionError::RefreshFailed {
            status: 400,
            status_text: "Bad Request".to_string(),
            body: r#"{"error":"invalid_grant"}"#.to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("400 Bad Request"));
        assert!(s.contains("invalid_grant"));
    }

    #[test]
    fn test_end_session_failed_display() {
        let error = SessionError::EndSessionFailed {
            status: 400,
            status_text: "Bad Request".to_string(),
            body: "session not active".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "End session failed: 400 Bad Request: session not active"
        );
    }

    #[test]
    fn test_status_accessor() {
        let error = SessionError::HttpStatus {
            status: 401,
            body: String::new(),
        };
        assert_eq!(error.status(), Some(401));
        assert_eq!(SessionError::NoTokens.status(), None);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: SessionError = json_error.into();
        assert!(matches!(error, SessionError::InvalidResponse(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: SessionError = yaml_error.into();
        assert!(matches!(error, SessionError::Config(_)));
    }

    #[test]
    fn test_keyring_error_conversion() {
        let error: SessionError = keyring::Error::NoEntry.into();
        assert!(matches!(error, SessionError::Storage(_)));
    }

    #[test]
    fn test_error_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<SessionError>();
    }
}
