// Read-only agent status, published by the scheduler after every tick over a watch channel.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub success: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentStatus {
    pub state: SchedulerState,
    /// Last collection succeeded and the last delivery (if any) did not end in the spool.
    pub connected: bool,
    pub last_collection_success: bool,
    pub last_delivery: Option<DeliveryReport>,
    pub buffered_samples: usize,
    pub next_flush_in: Duration,
    pub dropped_samples: u64,
    pub delivered_total: u64,
    pub spooled_total: u64,
}

impl AgentStatus {
    pub fn idle() -> Self {
        Self {
            state: SchedulerState::Idle,
            connected: false,
            last_collection_success: false,
            last_delivery: None,
            buffered_samples: 0,
            next_flush_in: Duration::ZERO,
            dropped_samples: 0,
            delivered_total: 0,
            spooled_total: 0,
        }
    }
}

/// Logs connected/disconnected transitions. Ends when the scheduler drops its sender.
pub fn spawn_status_logger(mut rx: watch::Receiver<AgentStatus>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut connected: Option<bool> = None;
        let mut state = rx.borrow().state;
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            if status.state != state {
                state = status.state;
                info!(state = ?state, "scheduler state changed");
            }
            if status.state != SchedulerState::Running || connected == Some(status.connected) {
                continue;
            }
            connected = Some(status.connected);
            if status.connected {
                info!(
                    buffered_samples = status.buffered_samples,
                    next_flush_secs = status.next_flush_in.as_secs(),
                    "connected"
                );
            } else {
                warn!(
                    last_collection_success = status.last_collection_success,
                    spooled_total = status.spooled_total,
                    "disconnected"
                );
            }
        }
    })
}
