//! Session data structure

use serde::{Deserialize, Serialize};

use crate::token::Token;
use crate::user::User;

/// Credentials and identity of the signed-in user.
///
/// Empty at startup, populated by login, cleared by logout or when a refresh
/// fails for good.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: Option<User>,
    pub access_token: Option<Token>,
    pub refresh_token: Option<Token>,
}

impl Session {
    pub fn new(access_token: Token, refresh_token: Token, user: User) -> Self {
        Self {
            user: Some(user),
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.access_token.is_none() && self.refresh_token.is_none()
    }

    /// A session can authorize requests once it carries an access token.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.as_ref().is_some_and(|t| !t.is_empty())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}
