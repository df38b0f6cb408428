//! Authorized backend calls from pages

use serde::Serialize;
use serde_json::Value;

use counsel_core::{ApiRequest, ApiResponse, Method};

use crate::commands::CommandResult;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct ApiResult {
    pub status: u16,
    /// JSON body when the backend sent JSON, otherwise the raw text
    pub body: Value,
}

impl From<ApiResponse> for ApiResult {
    fn from(response: ApiResponse) -> Self {
        let body = if response.body().is_empty() {
            Value::Null
        } else {
            response
                .json::<Value>()
                .unwrap_or_else(|_| Value::String(response.body().to_string()))
        };

        Self {
            status: response.status(),
            body,
        }
    }
}

/// Send a request through the gateway. Non-2xx answers other than an
/// unrecoverable 401 are returned to the page as data.
pub async fn api_request(
    state: &AppState,
    method: String,
    path: String,
    body: Option<Value>,
) -> CommandResult<ApiResult> {
    let method: Method = match method.parse() {
        Ok(m) => m,
        Err(e) => return CommandResult::err(e),
    };

    let controller = match state.controller() {
        Ok(c) => c,
        Err(e) => return CommandResult::err(e.user_message()),
    };

    let mut request = ApiRequest::new(method, path);
    if let Some(body) = body {
        request = request.with_body(body);
    }

    match controller.gateway().send(request).await {
        Ok(response) => CommandResult::ok(response.into()),
        Err(e) => {
            tracing::debug!(error = %e, "Page request failed");
            CommandResult::err(e.to_string())
        }
    }
}
