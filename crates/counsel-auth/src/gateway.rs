//! Request gateway
//!
//! Every authenticated call from the pages goes through here. The gateway
//! attaches the current access token, and on a 401 refreshes once and
//! retries once. A second 401, or a failed refresh, ends the session.

use std::sync::Arc;

use counsel_session::Token;

use crate::client::AuthClient;
use crate::error::GatewayError;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

#[derive(Clone)]
pub struct RequestGateway {
    auth: AuthClient,
    transport: Arc<dyn HttpTransport>,
}

impl RequestGateway {
    pub fn new(auth: AuthClient) -> Self {
        let transport = auth.transport();
        Self { auth, transport }
    }

    /// Send `request` with the session's access token.
    ///
    /// Fails fast with `SessionExpired` when no one is signed in. An access
    /// token whose claimed expiry has passed is refreshed before sending.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        let (mut access_token, _) = self.credentials()?;

        if access_token.is_expired() {
            tracing::debug!(path = %request.path, "Access token past claimed expiry; refreshing first");
            access_token = self.refresh_or_expire().await?;
        }

        let response = self.dispatch(&request, &access_token).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        tracing::debug!(path = %request.path, "Access token rejected; refreshing");

        // Another request may already have refreshed while this one was out
        let (latest, _) = self.credentials()?;
        if latest == access_token {
            self.refresh_or_expire().await?;
        }

        // The refresh may have rotated the refresh token as well
        let (retry_token, retry_refresh) = self.credentials()?;
        let response = self.dispatch(&request, &retry_token).await?;
        if response.is_unauthorized() {
            tracing::warn!(path = %request.path, "Request rejected after refresh");
            self.auth.expire_if_current(&retry_refresh);
            return Err(GatewayError::SessionExpired);
        }

        Ok(response)
    }

    fn credentials(&self) -> Result<(Token, Token), GatewayError> {
        let session = self.auth.store().get();
        match (session.access_token, session.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() => Ok((access, refresh)),
            _ => Err(GatewayError::SessionExpired),
        }
    }

    async fn refresh_or_expire(&self) -> Result<Token, GatewayError> {
        self.auth.refresh().await.map_err(|e| {
            tracing::info!(error = %e, "Refresh failed; session expired");
            GatewayError::SessionExpired
        })
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        access_token: &Token,
    ) -> Result<ApiResponse, GatewayError> {
        let request = request.clone().with_bearer(access_token.as_str());
        Ok(self.transport.send(request).await?)
    }
}
