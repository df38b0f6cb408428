//! Counsel Authentication
//!
//! - `AuthClient` exchanges credentials for tokens and owns every TokenStore write
//! - Refresh is single-flight: concurrent callers share one in-flight exchange
//! - `RequestGateway` authorizes page requests and retries once after a refresh
//! - Logout always clears local state, even when the backend is unreachable

mod client;
mod error;
mod gateway;
mod payload;
mod transport;

#[cfg(test)]
mod testing;

pub use client::{AuthClient, AuthSuccess};
pub use error::{AuthError, GatewayError, TransportError};
pub use gateway::RequestGateway;
pub use payload::RegistrationProfile;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, ReqwestTransport};

pub type Result<T> = std::result::Result<T, AuthError>;
