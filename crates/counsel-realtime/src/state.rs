//! Connection State Machine
//!
//! ```text
//! Idle
//!   ↓ login succeeded
//! Connecting ──────────────┐
//!   ↓ live       ↓ exhausted │ no session
//! Connected    Degraded    Failed
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Monitor created, nothing started
    Idle,
    /// Waiting for the channel to report liveness
    Connecting,
    /// Channel confirmed live
    Connected,
    /// Attempts exhausted; the session is usable without notifications
    Degraded,
    /// Login produced no session to monitor
    Failed,
}

impl ConnectionState {
    /// Check if transition to another state is valid
    pub fn can_transition_to(&self, target: ConnectionState) -> bool {
        match (self, target) {
            (ConnectionState::Idle, ConnectionState::Connecting) => true,
            (ConnectionState::Idle, ConnectionState::Failed) => true,
            (ConnectionState::Connecting, ConnectionState::Connected) => true,
            (ConnectionState::Connecting, ConnectionState::Degraded) => true,
            (ConnectionState::Connecting, ConnectionState::Failed) => true,
            // Terminal states stay put for the rest of the attempt
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Degraded | ConnectionState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConnectionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(ConnectionState::Idle),
            "connecting" => Ok(ConnectionState::Connecting),
            "connected" => Ok(ConnectionState::Connected),
            "degraded" => Ok(ConnectionState::Degraded),
            "failed" => Ok(ConnectionState::Failed),
            _ => Err(format!("Unknown connection state: {}", s)),
        }
    }
}
