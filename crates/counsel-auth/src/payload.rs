//! Wire shapes of the auth endpoints

use serde::{Deserialize, Serialize};
use serde_json::Value;

use counsel_session::{Token, User};

pub(crate) const LOGIN_PATH: &str = "/auth/login";
pub(crate) const REGISTER_PATH: &str = "/auth/register";
pub(crate) const REFRESH_PATH: &str = "/auth/refresh";
pub(crate) const LOGOUT_PATH: &str = "/auth/logout";

/// Fields required to create an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationProfile {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl RegistrationProfile {
    /// Wire names of required fields that are blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("email", self.email.trim()),
            ("password", self.password.as_str()),
            ("firstName", self.first_name.trim()),
            ("lastName", self.last_name.trim()),
            ("role", self.role.trim()),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub access_token_expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token_expires_in: Option<i64>,
}

impl AuthResponse {
    pub fn access(&self) -> Token {
        Token::expiring_in(self.access_token.clone(), self.access_token_expires_in)
    }

    pub fn refresh(&self) -> Token {
        Token::expiring_in(self.refresh_token.clone(), self.refresh_token_expires_in)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponse {
    pub access_token: String,
    /// Present only when the backend rotates refresh tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_token_expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token_expires_in: Option<i64>,
}

impl RefreshResponse {
    pub fn access(&self) -> Token {
        Token::expiring_in(self.access_token.clone(), self.access_token_expires_in)
    }

    pub fn rotated_refresh(&self) -> Option<Token> {
        self.refresh_token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| Token::expiring_in(t.clone(), self.refresh_token_expires_in))
    }
}

/// Pull a displayable message out of a backend error body.
///
/// Understands `{"message": ...}`, `{"error": ...}` and `{"errors": [...]}`,
/// where messages may be strings, string arrays or objects with a `message`
/// or `msg` field.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    ["message", "error", "errors"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(message_from)
}

fn message_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(message_from).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("msg"))
            .and_then(message_from),
        _ => None,
    }
}
