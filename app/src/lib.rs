//! Counsel client application
//!
//! - Pages are stateless; Rust owns the session
//! - Every page action goes through a command returning `CommandResult`
//! - Authenticated backend calls go through the request gateway

pub mod commands;
mod state;

pub use state::AppState;

use counsel_core::{Config, Result};

/// Bring the client up: logging, configuration from the environment, and
/// any session persisted by a previous run.
pub async fn start() -> Result<AppState> {
    counsel_core::init_logging();

    let config = Config::from_env()?;
    let state = AppState::new(&config)?;

    let controller = state.controller()?;
    let view = controller.resume().await;
    tracing::info!(status = %view.status, "Counsel client started");

    Ok(state)
}
