//! Connection monitor
//!
//! One monitor per sign-in attempt. It settles, then polls the channel's
//! liveness in fixed slots of `poll_interval` until the channel is live or
//! `max_attempts` slots have passed, so total wait never exceeds
//! `settle_delay + max_attempts * poll_interval`.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use crate::channel::RealtimeChannel;
use crate::clock::Clock;
use crate::error::RealtimeError;
use crate::state::ConnectionState;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorPolicy {
    /// Pause before the first poll so the handshake can begin
    #[serde(with = "millis")]
    pub settle_delay: Duration,
    /// Length of one poll slot; a probe slower than this counts as not live
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl MonitorPolicy {
    /// Upper bound on the time from start to a terminal report
    pub fn max_wait(&self) -> Duration {
        self.settle_delay + self.poll_interval * self.max_attempts
    }
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            poll_interval: Duration::from_millis(500),
            max_attempts: 10,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Terminal report of one confirmation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    Connected { polls: u32 },
    Degraded { polls: u32 },
    Failed,
    /// Stopped by `MonitorHandle::cancel`; nothing was reported
    Cancelled,
}

/// Cancels a running monitor from another task
#[derive(Clone)]
pub struct MonitorHandle {
    cancel: Arc<watch::Sender<bool>>,
    state: Arc<RwLock<ConnectionState>>,
}

impl MonitorHandle {
    /// Stop polling. Once this returns the monitor makes no further
    /// transitions and produces no report.
    pub fn cancel(&self) {
        // Taken under the state lock so no transition can interleave
        let _state = self.state.write();
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }
}

pub struct ConnectionMonitor {
    id: Uuid,
    policy: MonitorPolicy,
    clock: Arc<dyn Clock>,
    state: Arc<RwLock<ConnectionState>>,
    cancel: Arc<watch::Sender<bool>>,
    polls: AtomicU32,
}

impl ConnectionMonitor {
    pub fn new(policy: MonitorPolicy, clock: Arc<dyn Clock>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            policy,
            clock,
            state: Arc::new(RwLock::new(ConnectionState::Idle)),
            cancel: Arc::new(cancel),
            polls: AtomicU32::new(0),
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            cancel: Arc::clone(&self.cancel),
            state: Arc::clone(&self.state),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Liveness checks performed so far
    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    /// Record that sign-in produced no session, so there is nothing to watch.
    pub fn fail_without_session(&self) -> Result<MonitorOutcome> {
        if self.transition(ConnectionState::Failed)? {
            tracing::warn!(monitor_id = %self.id, "No session to monitor");
            Ok(MonitorOutcome::Failed)
        } else {
            Ok(MonitorOutcome::Cancelled)
        }
    }

    /// Confirm the channel is live. Runs at most once per monitor.
    pub async fn run(&self, channel: &dyn RealtimeChannel) -> Result<MonitorOutcome> {
        let mut cancelled = self.cancel.subscribe();

        if !self.transition(ConnectionState::Connecting)? {
            return Ok(MonitorOutcome::Cancelled);
        }
        tracing::debug!(
            monitor_id = %self.id,
            max_attempts = self.policy.max_attempts,
            "Confirming realtime connection"
        );

        tokio::select! {
            biased;
            _ = wait_cancelled(&mut cancelled) => return Ok(self.cancelled()),
            _ = self.clock.sleep(self.policy.settle_delay) => {}
        }

        for attempt in 1..=self.policy.max_attempts {
            let live = tokio::select! {
                biased;
                _ = wait_cancelled(&mut cancelled) => return Ok(self.cancelled()),
                live = self.poll_slot(channel, attempt) => live,
            };

            if live {
                if !self.transition(ConnectionState::Connected)? {
                    return Ok(self.cancelled());
                }
                tracing::info!(monitor_id = %self.id, polls = attempt, "Realtime connection confirmed");
                return Ok(MonitorOutcome::Connected { polls: attempt });
            }
        }

        if !self.transition(ConnectionState::Degraded)? {
            return Ok(self.cancelled());
        }
        let polls = self.polls();
        tracing::warn!(monitor_id = %self.id, polls, "Realtime connection not confirmed; continuing degraded");
        Ok(MonitorOutcome::Degraded { polls })
    }

    /// One poll slot. The probe and the slot timer start together; a live
    /// answer ends the slot early, anything else waits the slot out.
    async fn poll_slot(&self, channel: &dyn RealtimeChannel, attempt: u32) -> bool {
        self.polls.store(attempt, Ordering::SeqCst);
        let mut tick = self.clock.sleep(self.policy.poll_interval);

        tokio::select! {
            biased;
            live = channel.check_liveness() => match live {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(monitor_id = %self.id, attempt, error = %e, "Liveness check failed");
                }
            },
            _ = &mut tick => {
                tracing::debug!(monitor_id = %self.id, attempt, "Liveness check timed out");
                return false;
            }
        }

        tick.await;
        false
    }

    /// Apply a transition unless the monitor was cancelled. Returns `false`
    /// when cancelled.
    fn transition(&self, target: ConnectionState) -> Result<bool> {
        let mut state = self.state.write();
        if *self.cancel.borrow() {
            return Ok(false);
        }
        if !state.can_transition_to(target) {
            return Err(RealtimeError::InvalidTransition {
                from: state.to_string(),
                to: target.to_string(),
            });
        }
        *state = target;
        Ok(true)
    }

    fn cancelled(&self) -> MonitorOutcome {
        tracing::debug!(monitor_id = %self.id, polls = self.polls(), "Realtime confirmation cancelled");
        MonitorOutcome::Cancelled
    }
}

async fn wait_cancelled(cancelled: &mut watch::Receiver<bool>) {
    let _ = cancelled.wait_for(|c| *c).await;
}
