//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use counsel_realtime::MonitorPolicy;

use crate::error::CoreError;
use crate::Result;

const DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_REALTIME_URL: &str = "ws://localhost:3000/notifications";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the REST API; auth endpoints live under it
    pub api_base_url: String,
    /// WebSocket endpoint of the push-notification channel
    pub realtime_url: String,
    /// Path to the database file
    pub database_path: PathBuf,
    pub request_timeout: Duration,
    /// Post-login realtime confirmation schedule
    pub monitor: MonitorPolicy,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            database_path: data_dir.join("counsel.db"),
            request_timeout: Duration::from_secs(30),
            monitor: MonitorPolicy::default(),
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("Counsel"))
            .unwrap_or_else(|| PathBuf::from(".counsel"))
    }

    /// Defaults overridden by `COUNSEL_API_URL`, `COUNSEL_REALTIME_URL` and
    /// `COUNSEL_DATA_DIR`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("COUNSEL_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(Self::data_dir);
        let mut config = Self::new(data_dir);

        if let Some(value) = lookup("COUNSEL_API_URL") {
            config.api_base_url = value.trim().to_string();
        }
        if let Some(value) = lookup("COUNSEL_REALTIME_URL") {
            config.realtime_url = value.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn api_url(&self) -> Result<Url> {
        let url = parse_url("COUNSEL_API_URL", &self.api_base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CoreError::Config(format!("API URL must be http(s): {url}")));
        }
        Ok(url)
    }

    pub fn realtime_endpoint(&self) -> Result<Url> {
        let url = parse_url("COUNSEL_REALTIME_URL", &self.realtime_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(CoreError::Config(format!("Realtime URL must be ws(s): {url}")));
        }
        Ok(url)
    }

    pub fn validate(&self) -> Result<()> {
        self.api_url()?;
        self.realtime_endpoint()?;
        if self.monitor.max_attempts == 0 {
            return Err(CoreError::Config(
                "Realtime monitor needs at least one attempt".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url> {
    Url::parse(value.trim()).map_err(|e| CoreError::Config(format!("{name}: {e}")))
}

// Platform data directory lookup
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}
