//! Counsel Realtime
//!
//! Confirms after sign-in that the push-notification channel is live.
//! Polling is bounded: the monitor gives up after a fixed number of attempts
//! and reports a degraded (still signed-in) session instead of waiting.

mod channel;
mod clock;
mod error;
mod monitor;
mod state;

pub use channel::{Notification, RealtimeChannel, WebSocketChannel};
pub use clock::{Clock, TokioClock};
pub use error::RealtimeError;
pub use monitor::{ConnectionMonitor, MonitorHandle, MonitorOutcome, MonitorPolicy};
pub use state::ConnectionState;

pub type Result<T> = std::result::Result<T, RealtimeError>;
