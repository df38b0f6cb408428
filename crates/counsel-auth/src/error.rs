//! Authentication error types
//!
//! Display strings of `AuthError` and `GatewayError` are shown to users as-is.

use thiserror::Error;

pub(crate) const GENERIC_TRANSPORT_ERROR: &str =
    "Unable to reach the server. Please check your connection and try again.";
pub(crate) const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),

    /// Registration field issues, as reported by the backend
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Transport(String),

    #[error("Session refresh failed: {0}")]
    RefreshFailed(String),
}

impl AuthError {
    /// Message suitable for display on a page
    pub fn user_message(&self) -> String {
        match self {
            AuthError::RefreshFailed(_) => SESSION_EXPIRED_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Your session has expired. Please sign in again.")]
    SessionExpired,

    #[error("{0}")]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}
