//! Counsel Core
//!
//! Coordination layer for the client: wires storage, tokens, auth and the
//! realtime channel together and publishes the session state pages render.

mod config;
mod controller;
mod error;
mod view;

pub use config::Config;
pub use controller::SessionController;
pub use error::CoreError;
pub use view::{SessionStatus, SessionView, REALTIME_DEGRADED_WARNING};

// Re-export the collaborators pages and tests need
pub use counsel_auth::{
    ApiRequest, ApiResponse, AuthClient, AuthError, GatewayError, HttpTransport, Method,
    RegistrationProfile, RequestGateway, ReqwestTransport, TransportError,
};
pub use counsel_realtime::{
    Clock, ConnectionMonitor, ConnectionState, MonitorOutcome, MonitorPolicy, Notification,
    RealtimeChannel, RealtimeError, TokioClock, WebSocketChannel,
};
pub use counsel_session::{Session, SessionError, Token, TokenStore, User};
pub use counsel_storage::{Database, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // A second call (tests, embedding hosts) keeps the first subscriber
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
