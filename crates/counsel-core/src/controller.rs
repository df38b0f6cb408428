//! Session controller
//!
//! Runs the sign-in and sign-out journeys and owns the status pages see.
//! A successful sign-in is followed by realtime confirmation; the journey
//! ends `Ready` or `Degraded`, never stuck in `Connecting`.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

use counsel_auth::{
    AuthClient, AuthError, AuthSuccess, RegistrationProfile, ReqwestTransport, RequestGateway,
};
use counsel_realtime::{
    Clock, ConnectionMonitor, MonitorHandle, MonitorOutcome, MonitorPolicy, RealtimeChannel,
    TokioClock, WebSocketChannel,
};
use counsel_session::{Session, SubscriptionId, TokenStore};
use counsel_storage::Database;

use crate::config::Config;
use crate::view::{SessionStatus, SessionView, REALTIME_DEGRADED_WARNING};
use crate::Result;

const SESSION_EXPIRED: &str = "Your session has expired. Please sign in again.";
const NO_SESSION: &str = "Sign-in did not complete. Please try again.";

#[derive(Default)]
struct ControllerState {
    /// Bumped by every sign-in, sign-out and forced expiry; a journey whose
    /// number is stale publishes nothing
    attempt: u64,
    monitor: Option<MonitorHandle>,
    subscription: Option<SubscriptionId>,
}

pub struct SessionController {
    auth: AuthClient,
    gateway: RequestGateway,
    channel: Arc<dyn RealtimeChannel>,
    clock: Arc<dyn Clock>,
    policy: MonitorPolicy,
    view: Arc<watch::Sender<SessionView>>,
    state: Arc<Mutex<ControllerState>>,
}

impl SessionController {
    pub fn new(
        auth: AuthClient,
        channel: Arc<dyn RealtimeChannel>,
        policy: MonitorPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (view, _) = watch::channel(SessionView::logged_out());
        let view = Arc::new(view);
        let state = Arc::new(Mutex::new(ControllerState::default()));

        let subscription = auth.store().subscribe(watch_store(
            Arc::clone(&view),
            Arc::clone(&state),
            Arc::clone(&channel),
        ));
        state.lock().subscription = Some(subscription);

        Self {
            gateway: RequestGateway::new(auth.clone()),
            auth,
            channel,
            clock,
            policy,
            view,
            state,
        }
    }

    /// Production wiring: SQLite-backed store, reqwest transport and the
    /// WebSocket realtime channel.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        // Ensure data directory exists
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&config.database_path)?;
        let store = TokenStore::load(db);
        let transport = ReqwestTransport::new(config.api_url()?, config.request_timeout)?;
        let channel = WebSocketChannel::new(config.realtime_endpoint()?)?;

        Ok(Self::new(
            AuthClient::new(Arc::new(transport), store),
            Arc::new(channel),
            config.monitor,
            Arc::new(TokioClock),
        ))
    }

    /// Current session state
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    /// Authorized access to the backend for pages
    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    pub async fn login(&self, email: &str, password: &str) -> std::result::Result<SessionView, AuthError> {
        let attempt = self.begin(SessionView {
            status: SessionStatus::LoggingIn,
            ..SessionView::logged_out()
        });
        tracing::info!(attempt, "Signing in");

        let result = self.auth.login(email, password).await;
        self.finish_sign_in(attempt, result).await
    }

    pub async fn register(
        &self,
        profile: &RegistrationProfile,
    ) -> std::result::Result<SessionView, AuthError> {
        let attempt = self.begin(SessionView {
            status: SessionStatus::LoggingIn,
            ..SessionView::logged_out()
        });
        tracing::info!(attempt, role = %profile.role, "Registering");

        let result = self.auth.register(profile).await;
        self.finish_sign_in(attempt, result).await
    }

    /// Sign out. Realtime confirmation is cancelled and the status is
    /// `LoggedOut` before the backend is contacted.
    pub async fn logout(&self) {
        let attempt = self.begin(SessionView::logged_out());
        self.auth.logout().await;
        self.channel.disconnect().await;
        tracing::info!(attempt, "Signed out");
    }

    pub async fn refresh_access_token(&self) -> std::result::Result<SessionView, AuthError> {
        self.auth.refresh().await?;
        Ok(self.view())
    }

    /// Pick up a session persisted by an earlier run.
    pub async fn resume(&self) -> SessionView {
        let session = self.auth.store().get();
        if !session.is_authenticated() {
            return self.view();
        }

        let access_expired = session
            .access_token
            .as_ref()
            .is_some_and(|t| t.is_expired());
        if access_expired {
            if let Err(e) = self.auth.refresh().await {
                tracing::info!(error = %e, "Persisted session could not be renewed");
                self.begin(SessionView::logged_out_with_error(e.user_message()));
                return self.view();
            }
        }

        let session = self.auth.store().get();
        let attempt = self.begin(SessionView::signed_in(SessionStatus::Connecting, &session));
        tracing::info!(attempt, user_id = session.user_id().unwrap_or("-"), "Resuming session");
        self.confirm_realtime(attempt).await
    }

    /// Detach from the store and stop background work.
    pub async fn shutdown(&self) {
        let subscription = {
            let mut state = self.state.lock();
            state.attempt += 1;
            if let Some(monitor) = state.monitor.take() {
                monitor.cancel();
            }
            state.subscription.take()
        };
        if let Some(id) = subscription {
            self.auth.store().unsubscribe(id);
        }
        self.channel.disconnect().await;
    }

    /// Start a new journey: supersede the previous one and publish `view`.
    fn begin(&self, view: SessionView) -> u64 {
        let mut state = self.state.lock();
        state.attempt += 1;
        if let Some(monitor) = state.monitor.take() {
            monitor.cancel();
        }
        self.view.send_replace(view);
        state.attempt
    }

    async fn finish_sign_in(
        &self,
        attempt: u64,
        result: std::result::Result<AuthSuccess, AuthError>,
    ) -> std::result::Result<SessionView, AuthError> {
        match result {
            Ok(success) => {
                tracing::debug!(attempt, user_id = %success.user.id, "Credentials accepted");
                Ok(self.confirm_realtime(attempt).await)
            }
            Err(e) => {
                let state = self.state.lock();
                if state.attempt == attempt {
                    self.view
                        .send_replace(SessionView::logged_out_with_error(e.user_message()));
                }
                Err(e)
            }
        }
    }

    async fn confirm_realtime(&self, attempt: u64) -> SessionView {
        let monitor = ConnectionMonitor::new(self.policy, Arc::clone(&self.clock));
        let session = self.auth.store().get();

        {
            let mut state = self.state.lock();
            if state.attempt != attempt {
                return self.view.borrow().clone();
            }
            if !session.is_authenticated() {
                if let Err(e) = monitor.fail_without_session() {
                    tracing::error!(error = %e, "Monitor rejected failure report");
                }
                self.view
                    .send_replace(SessionView::logged_out_with_error(NO_SESSION));
                return self.view.borrow().clone();
            }
            state.monitor = Some(monitor.handle());
            self.view
                .send_replace(SessionView::signed_in(SessionStatus::Connecting, &session));
        }

        if let Some(access_token) = &session.access_token {
            if let Err(e) = self.channel.connect(access_token.as_str()).await {
                tracing::warn!(error = %e, "Realtime connect failed");
            }
        }

        let outcome = monitor.run(self.channel.as_ref()).await;
        let session = self.auth.store().get();

        let mut state = self.state.lock();
        if state.attempt != attempt {
            return self.view.borrow().clone();
        }
        state.monitor = None;

        let view = match outcome {
            Ok(MonitorOutcome::Connected { polls }) => {
                tracing::info!(attempt, polls, "Session ready");
                SessionView::signed_in(SessionStatus::Ready, &session)
            }
            Ok(MonitorOutcome::Degraded { polls }) => {
                tracing::warn!(attempt, polls, "Session ready without realtime notifications");
                degraded(&session)
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Realtime confirmation failed");
                degraded(&session)
            }
            Ok(MonitorOutcome::Failed) | Ok(MonitorOutcome::Cancelled) => {
                return self.view.borrow().clone();
            }
        };

        self.view.send_replace(view.clone());
        view
    }
}

impl Clone for SessionController {
    fn clone(&self) -> Self {
        Self {
            auth: self.auth.clone(),
            gateway: self.gateway.clone(),
            channel: Arc::clone(&self.channel),
            clock: Arc::clone(&self.clock),
            policy: self.policy,
            view: Arc::clone(&self.view),
            state: Arc::clone(&self.state),
        }
    }
}

fn degraded(session: &Session) -> SessionView {
    SessionView {
        warning: Some(REALTIME_DEGRADED_WARNING.to_string()),
        ..SessionView::signed_in(SessionStatus::Degraded, session)
    }
}

/// TokenStore subscriber: keeps the token preview current and turns an
/// externally cleared session (terminal refresh failure) into a sign-out.
fn watch_store(
    view: Arc<watch::Sender<SessionView>>,
    state: Arc<Mutex<ControllerState>>,
    channel: Arc<dyn RealtimeChannel>,
) -> impl Fn(&Session) + Send + Sync + 'static {
    move |session: &Session| {
        let mut state = state.lock();
        let status = view.borrow().status;
        if !status.is_signed_in() {
            return;
        }

        if session.is_authenticated() {
            let preview = session.access_token.as_ref().map(|t| t.preview());
            view.send_if_modified(|current| {
                if current.access_token_preview == preview {
                    return false;
                }
                current.access_token_preview = preview;
                true
            });
            return;
        }

        state.attempt += 1;
        if let Some(monitor) = state.monitor.take() {
            monitor.cancel();
        }
        view.send_replace(SessionView::logged_out_with_error(SESSION_EXPIRED));
        drop(state);
        tracing::warn!("Session expired; signed out");

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let channel = Arc::clone(&channel);
            runtime.spawn(async move {
                channel.disconnect().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use counsel_auth::{ApiRequest, ApiResponse, GatewayError, HttpTransport, TransportError};
    use counsel_realtime::RealtimeError;
    use counsel_session::{Token, User};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn user() -> User {
        User {
            id: "u-1".to_string(),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: "client".to_string(),
        }
    }

    struct StubBackend {
        access: Mutex<String>,
        refresh_ok: AtomicBool,
        refresh_calls: AtomicUsize,
        logout_fails: bool,
    }

    impl StubBackend {
        fn new() -> Self {
            Self {
                access: Mutex::new("access-0".to_string()),
                refresh_ok: AtomicBool::new(true),
                refresh_calls: AtomicUsize::new(0),
                logout_fails: false,
            }
        }

        fn auth_body(&self) -> String {
            json!({
                "user": user(),
                "accessToken": self.access.lock().clone(),
                "refreshToken": "refresh-0",
            })
            .to_string()
        }
    }

    #[async_trait]
    impl HttpTransport for StubBackend {
        async fn send(&self, request: ApiRequest) -> std::result::Result<ApiResponse, TransportError> {
            let body = request.body.clone().unwrap_or_default();
            match request.path.as_str() {
                "/auth/login" if body["password"] == "secret" => {
                    Ok(ApiResponse::new(200, self.auth_body()))
                }
                "/auth/login" => Ok(ApiResponse::new(
                    401,
                    r#"{"message":"Invalid email or password"}"#,
                )),
                "/auth/register" => Ok(ApiResponse::new(201, self.auth_body())),
                "/auth/refresh" => {
                    let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if !self.refresh_ok.load(Ordering::SeqCst) {
                        return Ok(ApiResponse::new(401, r#"{"message":"Refresh token expired"}"#));
                    }
                    let access = format!("access-refreshed-{n}");
                    *self.access.lock() = access.clone();
                    Ok(ApiResponse::new(200, json!({ "accessToken": access }).to_string()))
                }
                "/auth/logout" if self.logout_fails => {
                    Err(TransportError::Network("connection reset".to_string()))
                }
                "/auth/logout" => Ok(ApiResponse::new(204, "")),
                _ => {
                    let valid = self.access.lock().clone();
                    if request.bearer() == Some(valid.as_str()) {
                        Ok(ApiResponse::new(200, r#"{"cases":[]}"#))
                    } else {
                        Ok(ApiResponse::new(401, r#"{"message":"jwt expired"}"#))
                    }
                }
            }
        }
    }

    struct ScriptedChannel {
        live_on: Option<u32>,
        calls: AtomicU32,
        connects: Mutex<Vec<String>>,
        disconnects: AtomicU32,
        /// Signalled when this poll number is reached
        notify_on: Option<u32>,
        polled: Notify,
    }

    impl ScriptedChannel {
        fn live_on(poll: Option<u32>) -> Self {
            Self {
                live_on: poll,
                calls: AtomicU32::new(0),
                connects: Mutex::new(Vec::new()),
                disconnects: AtomicU32::new(0),
                notify_on: None,
                polled: Notify::new(),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RealtimeChannel for ScriptedChannel {
        async fn connect(&self, access_token: &str) -> std::result::Result<(), RealtimeError> {
            self.connects.lock().push(access_token.to_string());
            Ok(())
        }

        fn is_connected(&self) -> bool {
            false
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        async fn check_liveness(&self) -> std::result::Result<bool, RealtimeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.notify_on == Some(call) {
                self.polled.notify_one();
            }
            Ok(self.live_on.is_some_and(|n| call >= n))
        }
    }

    /// Sleeps complete after one scheduler turn
    struct InstantClock;

    #[async_trait]
    impl Clock for InstantClock {
        async fn sleep(&self, _duration: Duration) {
            tokio::task::yield_now().await;
        }
    }

    fn controller_with(
        backend: &Arc<StubBackend>,
        channel: &Arc<ScriptedChannel>,
        store: TokenStore,
    ) -> SessionController {
        SessionController::new(
            AuthClient::new(backend.clone(), store),
            channel.clone(),
            MonitorPolicy::default(),
            Arc::new(InstantClock),
        )
    }

    fn controller(backend: &Arc<StubBackend>, channel: &Arc<ScriptedChannel>) -> SessionController {
        controller_with(backend, channel, TokenStore::in_memory())
    }

    #[tokio::test]
    async fn test_login_ready_when_live_on_third_poll() {
        let backend = Arc::new(StubBackend::new());
        let channel = Arc::new(ScriptedChannel::live_on(Some(3)));
        let controller = controller(&backend, &channel);

        let view = controller.login("ada@example.com", "secret").await.unwrap();

        assert_eq!(view.status, SessionStatus::Ready);
        assert_eq!(view.user, Some(user()));
        assert_eq!(view.access_token_preview.as_deref(), Some("access-0"));
        assert_eq!(view.warning, None);
        assert_eq!(channel.calls(), 3);
        assert_eq!(*channel.connects.lock(), vec!["access-0"]);
        assert_eq!(controller.view(), view);
    }

    #[tokio::test]
    async fn test_login_degraded_when_never_live() {
        let backend = Arc::new(StubBackend::new());
        let channel = Arc::new(ScriptedChannel::live_on(None));
        let controller = controller(&backend, &channel);

        let view = controller.login("ada@example.com", "secret").await.unwrap();

        assert_eq!(view.status, SessionStatus::Degraded);
        assert_eq!(view.warning.as_deref(), Some(REALTIME_DEGRADED_WARNING));
        assert_eq!(channel.calls(), 10);
        // Degraded keeps the session usable
        assert!(controller.auth().store().get().is_authenticated());
        let response = controller.gateway().send(ApiRequest::get("/cases")).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_invalid_credentials_leave_session_empty() {
        let backend = Arc::new(StubBackend::new());
        let channel = Arc::new(ScriptedChannel::live_on(Some(1)));
        let controller = controller(&backend, &channel);

        let err = controller.login("ada@example.com", "wrong").await.unwrap_err();

        assert!(matches!(err, AuthError::InvalidCredentials(_)));
        let view = controller.view();
        assert_eq!(view.status, SessionStatus::LoggedOut);
        assert_eq!(view.error.as_deref(), Some("Invalid email or password"));
        assert!(controller.auth().store().get().is_empty());
        assert_eq!(channel.calls(), 0);
    }

    #[tokio::test]
    async fn test_register_follows_login_journey() {
        let backend = Arc::new(StubBackend::new());
        let channel = Arc::new(ScriptedChannel::live_on(Some(1)));
        let controller = controller(&backend, &channel);

        let profile = RegistrationProfile {
            email: "ada@example.com".to_string(),
            password: "secret".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: "client".to_string(),
        };
        let view = controller.register(&profile).await.unwrap();
        assert_eq!(view.status, SessionStatus::Ready);
    }

    #[tokio::test]
    async fn test_logout_while_connecting_stops_monitor() {
        let backend = Arc::new(StubBackend::new());
        let channel = Arc::new(ScriptedChannel {
            notify_on: Some(2),
            ..ScriptedChannel::live_on(None)
        });
        let controller = SessionController::new(
            AuthClient::new(backend.clone(), TokenStore::in_memory()),
            channel.clone(),
            MonitorPolicy {
                settle_delay: Duration::ZERO,
                poll_interval: Duration::from_millis(50),
                max_attempts: 10,
            },
            Arc::new(TokioClock),
        );

        let login = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.login("ada@example.com", "secret").await })
        };

        channel.polled.notified().await;
        controller.logout().await;

        let superseded = login.await.unwrap().unwrap();
        assert_eq!(superseded.status, SessionStatus::LoggedOut);

        // Nothing fires after the cancellation
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(channel.calls(), 2);
        assert_eq!(controller.view(), SessionView::logged_out());
        assert!(controller.auth().store().get().is_empty());
        assert_eq!(channel.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_forces_logout() {
        let backend = Arc::new(StubBackend::new());
        let channel = Arc::new(ScriptedChannel::live_on(Some(1)));
        let controller = controller(&backend, &channel);
        controller.login("ada@example.com", "secret").await.unwrap();

        backend.refresh_ok.store(false, Ordering::SeqCst);
        *backend.access.lock() = "rotated-server-side".to_string();

        let result = controller.gateway().send(ApiRequest::get("/cases")).await;
        assert_eq!(result, Err(GatewayError::SessionExpired));

        let view = controller.view();
        assert_eq!(view.status, SessionStatus::LoggedOut);
        assert_eq!(view.error.as_deref(), Some(SESSION_EXPIRED));
        assert!(controller.auth().store().get().is_empty());

        // No automatic retry afterwards
        let result = controller.gateway().send(ApiRequest::get("/cases")).await;
        assert_eq!(result, Err(GatewayError::SessionExpired));
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_clears_store_when_backend_fails() {
        let backend = Arc::new(StubBackend {
            logout_fails: true,
            ..StubBackend::new()
        });
        let channel = Arc::new(ScriptedChannel::live_on(Some(1)));
        let controller = controller(&backend, &channel);
        controller.login("ada@example.com", "secret").await.unwrap();

        controller.logout().await;

        assert!(controller.auth().store().get().is_empty());
        assert_eq!(controller.view(), SessionView::logged_out());
    }

    #[tokio::test]
    async fn test_refresh_access_token_updates_preview() {
        let backend = Arc::new(StubBackend::new());
        let channel = Arc::new(ScriptedChannel::live_on(Some(1)));
        let controller = controller(&backend, &channel);
        controller.login("ada@example.com", "secret").await.unwrap();

        let view = controller.refresh_access_token().await.unwrap();
        assert_eq!(view.status, SessionStatus::Ready);
        assert_eq!(view.access_token_preview.as_deref(), Some("access-r..."));
    }

    #[tokio::test]
    async fn test_resume_persisted_session() {
        let backend = Arc::new(StubBackend::new());
        let channel = Arc::new(ScriptedChannel::live_on(Some(2)));
        let store = TokenStore::in_memory();
        store.set(Token::new("access-0"), Token::new("refresh-0"), user());
        let controller = controller_with(&backend, &channel, store);

        assert_eq!(controller.view().status, SessionStatus::LoggedOut);
        let view = controller.resume().await;
        assert_eq!(view.status, SessionStatus::Ready);
        assert_eq!(view.user, Some(user()));
    }

    #[tokio::test]
    async fn test_resume_renews_expired_access_token() {
        let backend = Arc::new(StubBackend::new());
        let channel = Arc::new(ScriptedChannel::live_on(Some(1)));
        let store = TokenStore::in_memory();
        store.set(
            Token::expiring_in("access-0", Some(-60)),
            Token::new("refresh-0"),
            user(),
        );
        let controller = controller_with(&backend, &channel, store);

        let view = controller.resume().await;
        assert_eq!(view.status, SessionStatus::Ready);
        assert_eq!(*channel.connects.lock(), vec!["access-refreshed-1"]);
    }

    #[tokio::test]
    async fn test_resume_without_session_stays_logged_out() {
        let backend = Arc::new(StubBackend::new());
        let channel = Arc::new(ScriptedChannel::live_on(Some(1)));
        let controller = controller(&backend, &channel);

        assert_eq!(controller.resume().await, SessionView::logged_out());
        assert_eq!(channel.calls(), 0);
    }

    #[test]
    fn test_from_config_opens_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().join("data"));

        let controller = SessionController::from_config(&config).unwrap();
        assert_eq!(controller.view(), SessionView::logged_out());
        assert!(config.database_path.exists());
    }
}
