//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] counsel_storage::StorageError),

    #[error("Session error: {0}")]
    Session(#[from] counsel_session::SessionError),

    #[error("{0}")]
    Auth(#[from] counsel_auth::AuthError),

    #[error("{0}")]
    Gateway(#[from] counsel_auth::GatewayError),

    #[error("Transport error: {0}")]
    Transport(#[from] counsel_auth::TransportError),

    #[error("Realtime error: {0}")]
    Realtime(#[from] counsel_realtime::RealtimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session controller not initialized")]
    NotInitialized,
}

impl CoreError {
    /// Message safe to show on a page
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Auth(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
