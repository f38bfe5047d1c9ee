//! Background expiry sweep for pending overwrite sessions

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::session::SessionStore;

/// Periodically removes expired sessions from a [`SessionStore`]
pub struct SessionSweeper {
    sessions: Arc<SessionStore>,
    interval: Duration,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SessionSweeper {
    pub fn new(sessions: Arc<SessionStore>, interval: Duration) -> Self {
        Self {
            sessions,
            interval,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Whether the background loop is running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the sweep loop; a second call while running is a no-op
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let sessions = Arc::clone(&self.sessions);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sessions.sweep().await;
                    }
                    _ = &mut shutdown_rx => {
                        info!("Session sweeper shutdown requested");
                        break;
                    }
                }
            }
        });

        self.handle = Some(handle);
        info!(interval_secs = period.as_secs(), "Session sweeper started");
    }

    /// Signal the loop to stop and wait for it
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Error waiting for session sweeper to stop: {}", e);
            }
        }

        info!("Session sweeper stopped");
    }

    /// Run a single sweep now
    pub async fn sweep_once(&self) -> usize {
        self.sessions.sweep().await
    }
}

impl Drop for SessionSweeper {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}
