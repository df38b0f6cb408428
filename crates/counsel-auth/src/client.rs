//! Auth client
//!
//! Performs the credential exchanges and is the only writer of the
//! TokenStore. Failures come back as `AuthError` values carrying
//! user-displayable messages; nothing here panics on a bad response.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use counsel_session::{Token, TokenStore, User};

use crate::error::{AuthError, GENERIC_TRANSPORT_ERROR};
use crate::payload::{
    extract_error_message, AuthResponse, RefreshResponse, RegistrationProfile, LOGIN_PATH,
    LOGOUT_PATH, REFRESH_PATH, REGISTER_PATH,
};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use crate::Result;

const INVALID_CREDENTIALS: &str = "Invalid email or password.";
const MISSING_CREDENTIALS: &str = "Email and password are required.";
const REGISTRATION_REJECTED: &str = "Registration failed. Please review your details.";
const UNEXPECTED_RESPONSE: &str = "Unexpected response from the server. Please try again.";

type RefreshFuture = Shared<BoxFuture<'static, Result<Token>>>;

/// Tokens and identity issued by a successful login or registration
#[derive(Debug, Clone)]
pub struct AuthSuccess {
    pub user: User,
    pub access_token: Token,
    pub refresh_token: Token,
}

pub struct AuthClient {
    transport: Arc<dyn HttpTransport>,
    store: TokenStore,
    /// The in-flight refresh doubles as the lock: callers clone and await it
    in_flight: Arc<Mutex<Option<(u64, RefreshFuture)>>>,
    refresh_generation: Arc<AtomicU64>,
}

impl AuthClient {
    pub fn new(transport: Arc<dyn HttpTransport>, store: TokenStore) -> Self {
        Self {
            transport,
            store,
            in_flight: Arc::new(Mutex::new(None)),
            refresh_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub(crate) fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport)
    }

    /// Exchange email and password for a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSuccess> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials(
                MISSING_CREDENTIALS.to_string(),
            ));
        }

        let request = ApiRequest::post(LOGIN_PATH, json!({ "email": email, "password": password }));
        let response = self.send_unauthenticated(request).await?;

        if !response.is_success() {
            let error = classify_login_failure(&response);
            tracing::info!(status = response.status(), "Login rejected");
            return Err(error);
        }

        let success = self.accept_auth_response(&response)?;
        tracing::info!(user_id = %success.user.id, "Signed in");
        Ok(success)
    }

    /// Create an account; a successful registration signs the user in.
    pub async fn register(&self, profile: &RegistrationProfile) -> Result<AuthSuccess> {
        let missing = profile.missing_fields();
        if !missing.is_empty() {
            return Err(AuthError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let body = serde_json::to_value(profile)
            .map_err(|_| AuthError::Validation(REGISTRATION_REJECTED.to_string()))?;
        let response = self
            .send_unauthenticated(ApiRequest::post(REGISTER_PATH, body))
            .await?;

        if !response.is_success() {
            let error = classify_registration_failure(&response);
            tracing::info!(status = response.status(), "Registration rejected");
            return Err(error);
        }

        let success = self.accept_auth_response(&response)?;
        tracing::info!(user_id = %success.user.id, role = %success.user.role, "Registered");
        Ok(success)
    }

    /// Obtain a new access token with the stored refresh token.
    ///
    /// Single-flight: while one exchange is outstanding every caller awaits
    /// the same future and sees the same outcome. A failed refresh clears
    /// the session.
    pub async fn refresh(&self) -> Result<Token> {
        let (generation, refresh) = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.as_ref() {
                Some((generation, refresh)) => (*generation, refresh.clone()),
                None => {
                    let generation = self.refresh_generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let refresh = run_refresh(Arc::clone(&self.transport), self.store.clone())
                        .boxed()
                        .shared();
                    *in_flight = Some((generation, refresh.clone()));
                    (generation, refresh)
                }
            }
        };

        let result = refresh.await;

        let mut in_flight = self.in_flight.lock();
        if in_flight.as_ref().is_some_and(|(g, _)| *g == generation) {
            *in_flight = None;
        }

        result
    }

    /// Sign out. Local state is cleared first and unconditionally; the
    /// backend call is best-effort.
    pub async fn logout(&self) {
        let previous = self.store.get();
        self.store.clear();

        let Some(access_token) = previous.access_token.as_ref() else {
            return;
        };

        let request = ApiRequest::post(LOGOUT_PATH, json!({})).with_bearer(access_token.as_str());
        match self.transport.send(request).await {
            Ok(response) if response.is_success() => {
                tracing::info!(user_id = previous.user_id().unwrap_or("-"), "Signed out");
            }
            Ok(response) => {
                tracing::warn!(status = response.status(), "Backend logout rejected; ignored");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Backend logout failed; ignored");
            }
        }
    }

    /// Drop the local session without contacting the backend.
    pub fn expire_session(&self) {
        tracing::warn!("Session expired; clearing local credentials");
        self.store.clear();
    }

    /// Expire the session only if it is still the one holding `refresh_token`.
    pub(crate) fn expire_if_current(&self, refresh_token: &Token) -> bool {
        let expired = self.store.clear_if_refresh_token(refresh_token);
        if expired {
            tracing::warn!("Session expired; clearing local credentials");
        }
        expired
    }

    async fn send_unauthenticated(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.transport.send(request).await.map_err(|e| {
            tracing::warn!(error = %e, "Auth request failed");
            AuthError::Transport(GENERIC_TRANSPORT_ERROR.to_string())
        })
    }

    fn accept_auth_response(&self, response: &ApiResponse) -> Result<AuthSuccess> {
        let payload: AuthResponse = response.json().map_err(|e| {
            tracing::error!(error = %e, "Malformed auth response");
            AuthError::Transport(UNEXPECTED_RESPONSE.to_string())
        })?;

        let success = AuthSuccess {
            access_token: payload.access(),
            refresh_token: payload.refresh(),
            user: payload.user,
        };

        self.store.set(
            success.access_token.clone(),
            success.refresh_token.clone(),
            success.user.clone(),
        );

        Ok(success)
    }
}

impl Clone for AuthClient {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            store: self.store.clone(),
            in_flight: Arc::clone(&self.in_flight),
            refresh_generation: Arc::clone(&self.refresh_generation),
        }
    }
}

async fn run_refresh(transport: Arc<dyn HttpTransport>, store: TokenStore) -> Result<Token> {
    let Some(refresh_token) = store.get().refresh_token else {
        return Err(AuthError::RefreshFailed("no active session".to_string()));
    };

    // The refresh token travels only in the body of this call
    let request = ApiRequest::post(REFRESH_PATH, json!({ "refreshToken": refresh_token.as_str() }));

    let outcome = match transport.send(request).await {
        Ok(response) if response.is_success() => response
            .json::<RefreshResponse>()
            .map_err(|e| format!("malformed refresh response: {e}")),
        Ok(response) => Err(format!(
            "refresh rejected with status {}",
            response.status()
        )),
        Err(e) => Err(e.to_string()),
    };

    match outcome {
        Ok(payload) => {
            let access_token = payload.access();
            if store.set_access_token(&refresh_token, access_token.clone(), payload.rotated_refresh())
            {
                tracing::debug!("Access token refreshed");
                Ok(access_token)
            } else {
                Err(AuthError::RefreshFailed(
                    "session ended during refresh".to_string(),
                ))
            }
        }
        Err(reason) => {
            tracing::warn!(reason = %reason, "Token refresh failed; session expired");
            store.clear_if_refresh_token(&refresh_token);
            Err(AuthError::RefreshFailed(reason))
        }
    }
}

fn classify_login_failure(response: &ApiResponse) -> AuthError {
    let message = extract_error_message(response.body());
    match response.status() {
        400 | 401 | 403 | 404 | 422 => AuthError::InvalidCredentials(
            message.unwrap_or_else(|| INVALID_CREDENTIALS.to_string()),
        ),
        _ => AuthError::Transport(message.unwrap_or_else(|| GENERIC_TRANSPORT_ERROR.to_string())),
    }
}

fn classify_registration_failure(response: &ApiResponse) -> AuthError {
    let message = extract_error_message(response.body());
    match response.status() {
        400..=499 => {
            AuthError::Validation(message.unwrap_or_else(|| REGISTRATION_REJECTED.to_string()))
        }
        _ => AuthError::Transport(message.unwrap_or_else(|| GENERIC_TRANSPORT_ERROR.to_string())),
    }
}
