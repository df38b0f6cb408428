//! Session commands

use serde::Serialize;

use counsel_core::{RegistrationProfile, SessionView, User};

use crate::commands::CommandResult;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            display_name: user.display_name(),
            id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub status: String,
    pub user: Option<UserInfo>,
    /// Truncated for display only
    pub access_token: Option<String>,
    pub warning: Option<String>,
    pub error: Option<String>,
}

impl From<SessionView> for SessionInfo {
    fn from(view: SessionView) -> Self {
        Self {
            status: view.status.as_str().to_string(),
            user: view.user.map(UserInfo::from),
            access_token: view.access_token_preview,
            warning: view.warning,
            error: view.error,
        }
    }
}

pub async fn login(state: &AppState, email: String, password: String) -> CommandResult<SessionInfo> {
    let controller = match state.controller() {
        Ok(c) => c,
        Err(e) => return CommandResult::err(e.user_message()),
    };

    match controller.login(&email, &password).await {
        Ok(view) => CommandResult::ok(view.into()),
        Err(e) => CommandResult::err(e.user_message()),
    }
}

pub async fn register(state: &AppState, profile: RegistrationProfile) -> CommandResult<SessionInfo> {
    let controller = match state.controller() {
        Ok(c) => c,
        Err(e) => return CommandResult::err(e.user_message()),
    };

    match controller.register(&profile).await {
        Ok(view) => CommandResult::ok(view.into()),
        Err(e) => CommandResult::err(e.user_message()),
    }
}

pub async fn logout(state: &AppState) -> CommandResult<SessionInfo> {
    let controller = match state.controller() {
        Ok(c) => c,
        Err(e) => return CommandResult::err(e.user_message()),
    };

    controller.logout().await;
    CommandResult::ok(controller.view().into())
}

pub async fn refresh_access_token(state: &AppState) -> CommandResult<SessionInfo> {
    let controller = match state.controller() {
        Ok(c) => c,
        Err(e) => return CommandResult::err(e.user_message()),
    };

    match controller.refresh_access_token().await {
        Ok(view) => CommandResult::ok(view.into()),
        Err(e) => CommandResult::err(e.user_message()),
    }
}

pub fn get_session(state: &AppState) -> CommandResult<SessionInfo> {
    match state.with_controller(|controller| Ok(controller.view())) {
        Ok(view) => CommandResult::ok(view.into()),
        Err(e) => CommandResult::err(e.user_message()),
    }
}
