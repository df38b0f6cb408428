//! Scripted backend for auth tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use counsel_session::{Token, User};

use crate::error::TransportError;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

pub fn user() -> User {
    User {
        id: "u-1".to_string(),
        email: "ada@example.com".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        role: "client".to_string(),
    }
}

pub fn access(value: &str) -> Token {
    Token::new(value)
}

/// In-process backend.
///
/// - `/auth/login` accepts `ada@example.com` / `secret`
/// - `/auth/refresh` issues `access-N` after `refresh_delay`
/// - any other path answers 200 only to the currently valid access token
pub struct FakeBackend {
    pub valid_access: Mutex<String>,
    pub refresh_calls: AtomicUsize,
    pub refresh_delay: Duration,
    pub refresh_status: Mutex<u16>,
    pub rotate_refresh: bool,
    pub logout_fails: bool,
    pub unreachable: bool,
    /// Resource calls answer 401 no matter which token is presented
    pub always_unauthorized: bool,
    pub requests: Mutex<Vec<ApiRequest>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            valid_access: Mutex::new("access-0".to_string()),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay: Duration::from_millis(20),
            refresh_status: Mutex::new(200),
            rotate_refresh: false,
            logout_fails: false,
            unreachable: false,
            always_unauthorized: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    /// Make the backend reject the token it handed out last
    pub fn revoke_access(&self) {
        *self.valid_access.lock() = "revoked".to_string();
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().push(request.clone());

        if self.unreachable {
            return Err(TransportError::Network("connection refused".to_string()));
        }

        match request.path.as_str() {
            "/auth/login" => {
                let body = request.body.clone().unwrap_or_default();
                if body["email"] == "ada@example.com" && body["password"] == "secret" {
                    let access = self.valid_access.lock().clone();
                    Ok(ApiResponse::new(
                        200,
                        json!({
                            "user": user(),
                            "accessToken": access,
                            "refreshToken": "refresh-0",
                        })
                        .to_string(),
                    ))
                } else {
                    Ok(ApiResponse::new(
                        401,
                        r#"{"message":"Invalid email or password"}"#,
                    ))
                }
            }
            "/auth/register" => {
                let body = request.body.clone().unwrap_or_default();
                if body["email"] == "taken@example.com" {
                    return Ok(ApiResponse::new(
                        409,
                        r#"{"errors":[{"field":"email","message":"Email already registered"}]}"#,
                    ));
                }
                let mut registered = user();
                registered.email = body["email"].as_str().unwrap_or_default().to_string();
                Ok(ApiResponse::new(
                    201,
                    json!({
                        "user": registered,
                        "accessToken": "access-0",
                        "refreshToken": "refresh-0",
                    })
                    .to_string(),
                ))
            }
            "/auth/refresh" => {
                let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(self.refresh_delay).await;

                let status = *self.refresh_status.lock();
                if status != 200 {
                    return Ok(ApiResponse::new(status, r#"{"message":"Refresh token expired"}"#));
                }

                let access = format!("access-{n}");
                *self.valid_access.lock() = access.clone();
                let body = if self.rotate_refresh {
                    json!({"accessToken": access, "refreshToken": format!("refresh-{n}")})
                } else {
                    json!({"accessToken": access})
                };
                Ok(ApiResponse::new(200, body.to_string()))
            }
            "/auth/logout" => {
                if self.logout_fails {
                    Err(TransportError::Network("connection reset".to_string()))
                } else {
                    Ok(ApiResponse::new(204, ""))
                }
            }
            _ => {
                let valid = self.valid_access.lock().clone();
                if !self.always_unauthorized && request.bearer() == Some(valid.as_str()) {
                    Ok(ApiResponse::new(200, r#"{"ok":true}"#))
                } else {
                    Ok(ApiResponse::new(401, r#"{"message":"jwt expired"}"#))
                }
            }
        }
    }
}

pub fn backend() -> Arc<FakeBackend> {
    Arc::new(FakeBackend::new())
}
