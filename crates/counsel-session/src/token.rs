//! Opaque bearer credentials

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const PREVIEW_CHARS: usize = 8;

/// Opaque bearer credential with the expiry the backend claimed for it, if any.
///
/// The expiry is never verified client-side; it only drives proactive refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Build a token whose claimed lifetime is `expires_in_secs` from now.
    pub fn expiring_in(value: impl Into<String>, expires_in_secs: Option<i64>) -> Self {
        let token = Self::new(value);
        match expires_in_secs {
            Some(secs) => token.with_expiry(Utc::now() + Duration::seconds(secs)),
            None => token,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Unknown expiry counts as not expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |exp| exp <= now)
    }

    /// Truncated form for display. Never use it as a credential.
    pub fn preview(&self) -> String {
        let mut chars = self.value.chars();
        let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &self.preview())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
