//! Background expiry sweep.

use super::ContextStore;
use crate::config::ContextSettings;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often to sweep and how long a context may stay idle.
#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    pub interval: Duration,
    pub max_idle: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            max_idle: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl From<&ContextSettings> for SweepConfig {
    fn from(settings: &ContextSettings) -> Self {
        Self {
            interval: settings.sweep_interval(),
            max_idle: settings.max_idle(),
        }
    }
}

/// Handle to the running sweep task.
pub struct ContextSweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ContextSweeper {
    /// Start sweeping `store` on a timer. Must be called within a tokio runtime.
    pub fn spawn(store: Arc<ContextStore>, config: SweepConfig) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        info!(
            "Starting context sweeper (interval: {:?}, max idle: {:?})",
            config.interval, config.max_idle
        );

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing can be idle yet.
            interval.tick().await;

            let max_idle = TimeDelta::from_std(config.max_idle).unwrap_or(TimeDelta::MAX);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = sweep_once(&store, max_idle, &token);
                        if removed > 0 {
                            info!("Swept {} idle contexts", removed);
                        } else {
                            debug!("Sweep found no idle contexts");
                        }
                    }
                }
            }

            debug!("Context sweeper stopped");
        });

        Self { cancel, handle }
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the task and wait for it to finish. A sweep in progress stops
    /// between contexts, never halfway through one.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Context sweeper task failed: {}", e);
        }
    }
}

/// Delete idle contexts one at a time, checking for cancellation in between.
fn sweep_once(store: &ContextStore, max_idle: TimeDelta, cancel: &CancellationToken) -> usize {
    let now = Utc::now();
    let mut removed = 0;

    for id in store.expired_ids(now, max_idle) {
        if cancel.is_cancelled() {
            debug!("Sweep cancelled with contexts remaining");
            break;
        }
        if store.delete_if_idle(&id, now, max_idle) {
            removed += 1;
        }
    }

    removed
}
