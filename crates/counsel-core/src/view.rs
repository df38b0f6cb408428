//! Reactive session state consumed by pages

use serde::{Deserialize, Serialize};

use counsel_session::{Session, User};

pub const REALTIME_DEGRADED_WARNING: &str = "Realtime notifications are unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    LoggedOut,
    LoggingIn,
    /// Signed in; confirming the realtime channel
    Connecting,
    Ready,
    /// Signed in without realtime notifications
    Degraded,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::LoggedOut => "loggedout",
            SessionStatus::LoggingIn => "loggingin",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Ready => "ready",
            SessionStatus::Degraded => "degraded",
        }
    }

    /// Signed in, whether or not realtime is confirmed yet
    pub fn is_signed_in(&self) -> bool {
        matches!(
            self,
            SessionStatus::Connecting | SessionStatus::Ready | SessionStatus::Degraded
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "loggedout" => Ok(SessionStatus::LoggedOut),
            "loggingin" => Ok(SessionStatus::LoggingIn),
            "connecting" => Ok(SessionStatus::Connecting),
            "ready" => Ok(SessionStatus::Ready),
            "degraded" => Ok(SessionStatus::Degraded),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// What a page renders about the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub status: SessionStatus,
    pub user: Option<User>,
    /// Truncated for display; never a usable credential
    pub access_token_preview: Option<String>,
    /// Non-fatal condition, e.g. realtime unavailable
    pub warning: Option<String>,
    pub error: Option<String>,
}

impl SessionView {
    pub fn logged_out() -> Self {
        Self {
            status: SessionStatus::LoggedOut,
            user: None,
            access_token_preview: None,
            warning: None,
            error: None,
        }
    }

    pub fn logged_out_with_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::logged_out()
        }
    }

    /// Signed-in view of `session` in `status`
    pub fn signed_in(status: SessionStatus, session: &Session) -> Self {
        Self {
            status,
            user: session.user.clone(),
            access_token_preview: session.access_token.as_ref().map(|t| t.preview()),
            warning: None,
            error: None,
        }
    }
}

impl Default for SessionView {
    fn default() -> Self {
        Self::logged_out()
    }
}
