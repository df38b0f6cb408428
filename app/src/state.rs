//! Application state management
use counsel_core::{Config, CoreError, Result, SessionController};
use parking_lot::RwLock;
use std::sync::Arc;

/// Thread-safe application state wrapper
pub struct AppState {
    controller: Arc<RwLock<Option<SessionController>>>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        let controller = SessionController::from_config(config)?;
        Ok(Self::with_session_controller(controller))
    }

    pub fn with_session_controller(controller: SessionController) -> Self {
        Self {
            controller: Arc::new(RwLock::new(Some(controller))),
        }
    }

    pub fn with_controller<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SessionController) -> Result<T>,
    {
        let guard = self.controller.read();
        match guard.as_ref() {
            Some(controller) => f(controller),
            None => Err(CoreError::NotInitialized),
        }
    }

    /// Handle for async commands; the lock is not held across awaits.
    pub fn controller(&self) -> Result<SessionController> {
        self.with_controller(|controller| Ok(controller.clone()))
    }

    /// Detach the controller and stop its background work.
    pub async fn shutdown(&self) {
        let controller = self.controller.write().take();
        if let Some(controller) = controller {
            controller.shutdown().await;
        }
    }
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
        }
    }
}
