//! Realtime error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("Invalid realtime URL: {0}")]
    InvalidUrl(String),

    #[error("Realtime connection failed: {0}")]
    Connection(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}
