//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
///
/// `Display` output is what the gate shows inline, so provider messages
/// are passed through without a prefix.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The identity provider rejected the request (bad phone, wrong code, ...)
    #[error("{0}")]
    Provider(String),

    /// Federated sign-in could not be completed
    #[error("Sign-in failed: {0}")]
    OAuth(String),

    /// Token refresh error
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// No session
    #[error("Not logged in")]
    NotLoggedIn,

    /// Session was invalidated server-side
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] gate_storage::StorageError),

    /// HTTP request error
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
