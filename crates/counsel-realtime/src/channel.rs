//! Realtime channel
//!
//! The push transport is an external collaborator; the monitor only needs
//! to ask it whether it is live. `WebSocketChannel` is the production
//! transport, authenticated with the access token as a `token` query
//! parameter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::RealtimeError;
use crate::Result;

const NOTIFICATION_BUFFER: usize = 64;

#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Begin connecting. Returns once the attempt is under way; liveness is
    /// reported later through `is_connected`.
    async fn connect(&self, access_token: &str) -> Result<()>;

    fn is_connected(&self) -> bool;

    async fn disconnect(&self);

    /// Liveness as seen by the connection monitor. An error counts as
    /// "not live yet".
    async fn check_liveness(&self) -> Result<bool> {
        Ok(self.is_connected())
    }
}

/// Push message received on the realtime channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

/// One connection attempt. The liveness flag belongs to the attempt, so a
/// superseded task can never mark a newer connection live.
struct Connection {
    live: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct WebSocketChannel {
    url: Url,
    notifications: broadcast::Sender<Notification>,
    connection: Mutex<Option<Connection>>,
}

impl WebSocketChannel {
    pub fn new(url: Url) -> Result<Self> {
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(RealtimeError::InvalidUrl(format!(
                    "unsupported scheme '{other}' in {url}"
                )))
            }
        }

        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Ok(Self {
            url,
            notifications,
            connection: Mutex::new(None),
        })
    }

    /// Receive notifications pushed after this call
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    fn authenticated_url(&self, access_token: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("token", access_token);
        url
    }

    fn stop(&self) {
        if let Some(connection) = self.connection.lock().take() {
            let _ = connection.shutdown.send(true);
            connection.task.abort();
        }
    }
}

#[async_trait]
impl RealtimeChannel for WebSocketChannel {
    async fn connect(&self, access_token: &str) -> Result<()> {
        self.stop();

        let url = self.authenticated_url(access_token);
        let live = Arc::new(AtomicBool::new(false));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_connection(
            url,
            Arc::clone(&live),
            self.notifications.clone(),
            shutdown_rx,
        ));

        *self.connection.lock() = Some(Connection {
            live,
            shutdown,
            task,
        });
        tracing::debug!(host = self.url.host_str().unwrap_or("-"), "Realtime connection started");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .is_some_and(|connection| connection.live.load(Ordering::SeqCst))
    }

    async fn disconnect(&self) {
        self.stop();
        tracing::debug!("Realtime connection closed");
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_connection(
    url: Url,
    live: Arc<AtomicBool>,
    notifications: broadcast::Sender<Notification>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut stream, _) = match connect_async(url.as_str()).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(error = %e, "Realtime handshake failed");
            return;
        }
    };

    live.store(true, Ordering::SeqCst);
    tracing::info!("Realtime channel live");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = stream.close(None).await;
                break;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let notification = Notification {
                        payload: text.as_str().to_string(),
                        received_at: Utc::now(),
                    };
                    // No receivers is fine
                    let _ = notifications.send(notification);
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("Realtime channel closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Realtime channel error");
                    break;
                }
            }
        }
    }

    live.store(false, Ordering::SeqCst);
}
